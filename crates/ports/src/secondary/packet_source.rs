use domain::common::error::DomainError;

/// Blocking source of raw link-layer frames.
///
/// The capture loop polls this from its own OS thread. `Ok(None)` is a
/// timeout tick with no frame, which the loop uses to check for
/// shutdown; `Err` means the source is gone (device closed or capture
/// failure).
pub trait PacketSource: Send {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DomainError>;
}
