//! Data-plane error types

use core::fmt;

pub type Result<T> = core::result::Result<T, NicError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicError {
    /// Packet would exceed the configured maximum word count.
    PacketTooLong,
    /// Packet ended before a full header was received.
    PacketTooShort,
    /// Target packet descriptor still holds an undrained packet.
    DescriptorBusy,
    /// Not enough free ring slots for the request.
    BufferFull,
    /// A word was pushed with no valid byte lanes.
    MalformedInput,
    /// Transfer id has no reserved slots left to write.
    NoReservation,
    /// Transfer id outside the configured range.
    InvalidTransferId,
    /// Bounded control queue is at capacity.
    QueueFull,
    /// Engine is not idle and cannot accept a new request.
    Busy,
    /// Configuration rejected at construction.
    InvalidConfig(&'static str),
}

impl fmt::Display for NicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLong => write!(f, "Packet too long"),
            Self::PacketTooShort => write!(f, "Packet too short for header"),
            Self::DescriptorBusy => write!(f, "Packet descriptor busy"),
            Self::BufferFull => write!(f, "Buffer full"),
            Self::MalformedInput => write!(f, "Word carries no valid bytes"),
            Self::NoReservation => write!(f, "No reservation for transfer"),
            Self::InvalidTransferId => write!(f, "Invalid transfer id"),
            Self::QueueFull => write!(f, "Queue full"),
            Self::Busy => write!(f, "Engine busy"),
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display() {
        assert_eq!(NicError::BufferFull.to_string(), "Buffer full");
        assert_eq!(
            NicError::InvalidConfig("word_bits").to_string(),
            "Invalid configuration: word_bits"
        );
    }
}
