use thiserror::Error as ThisError;

/// Failures raised by domain operations. Each variant propagates to the
/// nearest caller that declares recovery for it; anything that would
/// indicate a bug in the caller (not in the analyzed program) is a panic
/// instead.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An abstract value could not be materialised into a concrete one.
    #[error("value cannot be materialised")]
    Concretization,
    /// An update would yield an infeasible state.
    #[error("update yields an infeasible state")]
    Empty,
    /// Dereference of an empty address set.
    #[error("dereference of an empty address set")]
    BotDeref,
    /// An address set too wide to enumerate.
    #[error("address set cannot be enumerated")]
    EnumFailure,
    /// A missing dimension, or no match within a bounded scan.
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Section(#[from] argus_loader::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
