#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    Timeout,
    Cancelled,
}

impl core::fmt::Display for HandoffError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HandoffError::Timeout => {
                write!(f, "wait deadline expired")
            }
            HandoffError::Cancelled => {
                write!(f, "wait cancelled")
            }
        }
    }
}

impl std::error::Error for HandoffError {}

/// Failed put: hands the undelivered value back to the caller.
pub enum PutError<T> {
    Timeout(T),
    Cancelled(T),
}

impl<T> PutError<T> {
    pub fn into_value(self) -> T {
        match self {
            PutError::Timeout(v) => v,
            PutError::Cancelled(v) => v,
        }
    }

    pub fn reason(&self) -> HandoffError {
        match self {
            PutError::Timeout(_) => HandoffError::Timeout,
            PutError::Cancelled(_) => HandoffError::Cancelled,
        }
    }
}

impl<T> core::fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "put failed: {}", self.reason())
    }
}

impl<T> core::fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PutError::Timeout(_) => write!(f, "Timeout(..)"),
            PutError::Cancelled(_) => write!(f, "Cancelled(..)"),
        }
    }
}
