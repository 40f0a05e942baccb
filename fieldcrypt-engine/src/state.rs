//! Context states as reported by the native engine.

use std::fmt;

/// The state a [`CryptoContext`](crate::CryptoContext) is waiting in.
///
/// Each non-terminal state names the side effect the driver must perform
/// before the context can make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Needs the `listCollections` result for the target collection.
    NeedCollectionInfo,
    /// Needs the command annotated with encryption markings.
    NeedMarkings,
    /// Needs credentials for the configured KMS providers.
    NeedKmsCredentials,
    /// Needs data key documents from the key vault.
    NeedKeys,
    /// Has key material that must be decrypted by a KMS.
    NeedKms,
    /// Output is available through `finish`.
    Ready,
    /// Finished without output.
    Done,
    /// A state code this driver does not know. Seen when the native library
    /// is newer than the driver.
    Unrecognized(i32),
}

impl State {
    /// Maps the engine's raw state code.
    ///
    /// Code 0 is the engine's error state; engines surface it as an
    /// [`EngineError`](crate::EngineError) from `state()` instead of
    /// passing it through here, so it maps to `Unrecognized(0)`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::NeedCollectionInfo,
            2 => Self::NeedMarkings,
            3 => Self::NeedKeys,
            4 => Self::NeedKms,
            5 => Self::Ready,
            6 => Self::Done,
            7 => Self::NeedKmsCredentials,
            other => Self::Unrecognized(other),
        }
    }

    /// Returns the engine's raw code for this state.
    pub fn code(self) -> i32 {
        match self {
            Self::NeedCollectionInfo => 1,
            Self::NeedMarkings => 2,
            Self::NeedKeys => 3,
            Self::NeedKms => 4,
            Self::Ready => 5,
            Self::Done => 6,
            Self::NeedKmsCredentials => 7,
            Self::Unrecognized(code) => code,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeedCollectionInfo => f.write_str("NEED_MONGO_COLLINFO"),
            Self::NeedMarkings => f.write_str("NEED_MONGO_MARKINGS"),
            Self::NeedKmsCredentials => f.write_str("NEED_KMS_CREDENTIALS"),
            Self::NeedKeys => f.write_str("NEED_MONGO_KEYS"),
            Self::NeedKms => f.write_str("NEED_KMS"),
            Self::Ready => f.write_str("READY"),
            Self::Done => f.write_str("DONE"),
            Self::Unrecognized(code) => write!(f, "UNRECOGNIZED({code})"),
        }
    }
}
