pub mod handoff_error;
