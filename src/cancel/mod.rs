pub mod cancel;
