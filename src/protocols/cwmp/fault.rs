//! The fixed set of CWMP fault codes this simulator ever emits.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    MethodNotSupported,
    DeviceNotReady,
    InvalidArguments,
    TransferFailure,
    InvalidUrlScheme,
}

impl FaultCode {
    pub const fn code(self) -> u32 {
        match self {
            FaultCode::MethodNotSupported => 9000,
            FaultCode::DeviceNotReady => 9002,
            FaultCode::InvalidArguments => 9003,
            FaultCode::TransferFailure => 9010,
            FaultCode::InvalidUrlScheme => 9016,
        }
    }

    pub const fn default_string(self) -> &'static str {
        match self {
            FaultCode::MethodNotSupported => "Method not supported",
            FaultCode::DeviceNotReady => "Device not ready to accept requests",
            FaultCode::InvalidArguments => "Invalid arguments",
            FaultCode::TransferFailure => "Transfer failure",
            FaultCode::InvalidUrlScheme => "Invalid URL scheme",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.default_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_table() {
        assert_eq!(FaultCode::MethodNotSupported.code(), 9000);
        assert_eq!(FaultCode::DeviceNotReady.code(), 9002);
        assert_eq!(FaultCode::InvalidArguments.code(), 9003);
        assert_eq!(FaultCode::TransferFailure.code(), 9010);
        assert_eq!(FaultCode::InvalidUrlScheme.code(), 9016);
    }
}
