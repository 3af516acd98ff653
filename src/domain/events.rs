/// Last observed network reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Unknown,
    Reachable,
    Unreachable,
}

impl ConnectivityStatus {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Reachable
        } else {
            Self::Unreachable
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Self::Unknown => "CONNECTIVITY_UNKNOWN",
            Self::Reachable => "CONNECTIVITY_REACHABLE",
            Self::Unreachable => "CONNECTIVITY_UNREACHABLE",
        }
    }
}

/// Edge event raised when reachability actually changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityTransition {
    BecameReachable,
    BecameUnreachable,
}
