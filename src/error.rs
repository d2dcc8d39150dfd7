use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure kinds surfaced by the data plane.
///
/// Verification routines (`Transaction::verify`, `MultiTransaction::verify`,
/// `MerkleProof::verify`, `Block::verify_signature`, `Block::is_valid_next`)
/// return booleans and never produce these.
#[derive(Debug, Error)]
pub enum Error {
    /// A precondition on the arguments was violated.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown node handle or batch digest.
    #[error("not found: {0}")]
    NotFound(String),

    /// The unspent balance cannot cover the requested amount.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u128 },

    /// A batch carried a transaction from a different sender.
    #[error("sender mismatch: batch sender {expected}, transaction sender {found}")]
    SenderMismatch { expected: String, found: String },

    /// Cryptographic verification failed on the admission path.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The batch digest is already staged in the pool.
    #[error("duplicate batch digest {0}")]
    Duplicate(String),

    /// A batch operation requires at least one transaction.
    #[error("batch contains no transactions")]
    EmptyBatch,

    /// Key parsing or signing-provider failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Database I/O failure in the pool store.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}
