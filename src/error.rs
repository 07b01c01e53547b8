use std::path::PathBuf;

/// Custom Result type for readsplit operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the readsplit library, encompassing all possible error cases
/// that can occur while detecting split points and rewriting raw signal.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to signal container header processing
    HeaderError(#[from] HeaderError),
    /// Errors that occur while reading signal containers
    ReadError(#[from] ReadError),
    /// Errors that occur while writing signal containers or manifests
    WriteError(#[from] WriteError),
    /// Errors raised by the basecall record stream
    StreamError(#[from] StreamError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// Errors from writing tab/space separated manifests
    CsvError(#[from] csv::Error),
    /// Errors from parsing read identifiers
    UuidError(#[from] uuid::Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}

/// Errors specific to processing and validating signal container headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the header does not match the expected value
    ///
    /// # Arguments
    /// * `u32` - The invalid magic number that was found
    #[error("Invalid magic number: {0}")]
    InvalidMagicNumber(u32),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u8` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The buffer is smaller than a header
    ///
    /// # Arguments
    /// * First `usize` - The actual number of bytes provided
    /// * Second `usize` - The expected number of bytes
    #[error("Invalid number of bytes provided: {0}. Expected: {1}")]
    InvalidSize(usize, usize),
}

/// Errors that can occur while reading signal containers
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The file being read is not a regular file (e.g., it might be a directory or special file)
    #[error("File is not regular")]
    IncompatibleFile,

    /// The file ends in the middle of a record
    ///
    /// # Arguments
    /// * `usize` - The byte position where the truncation was detected
    #[error("Record extends beyond the end of the file - possibly truncated at byte pos {0}")]
    FileTruncation(usize),

    /// A stored end reason code is not recognised
    #[error("Unknown end reason code: {0}")]
    InvalidEndReason(u8),

    /// The decompressed payload does not hold the advertised number of samples
    #[error("Signal payload holds {got} bytes but {expected} samples were advertised")]
    PayloadMismatch { expected: u64, got: usize },

    /// A requested read was not present and missing reads were not tolerated
    #[error("Read {0} not found in container")]
    MissingRead(String),
}

/// Errors that can occur while writing signal containers or manifests
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The output already exists and overwriting was not requested
    #[error("Output file already exists: {0:?} (use overwrite to replace it)")]
    OutputCollision(PathBuf),
}

/// Errors raised while pulling basecalled records from the input stream
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// A metadata tag was present but carried an unexpected type
    #[error("Tag {tag} on read {read_id} has an unsupported type")]
    InvalidTagType { tag: String, read_id: String },

    /// The read name is not valid UTF-8
    #[error("Read name is not valid UTF-8")]
    InvalidReadName,

    /// Errors from the htslib bindings
    #[cfg(feature = "htslib")]
    #[error(transparent)]
    Htslib(#[from] rust_htslib::errors::Error),
}
