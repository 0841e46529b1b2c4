//! Well-known attribute keys used across harvested records.
//!
//! Attribute keys are handle-style data type PIDs registered in the data
//! type registry. Only the keys the core itself needs are listed here;
//! repository-specific extractors bring their own.

/// Clear-text location of the digital object (source URL or DOI).
///
/// The relationship resolver matches presumed target identifiers against
/// this entry when a record's PID is not yet final.
pub const DIGITAL_OBJECT_LOCATION: &str = "21.T11148/b8457812905b83046284";

/// Reference to the record describing the repository a record came from.
pub const PRIMARY_SOURCE: &str = "21.T11148/a753134738da82809fc1";

/// Display name for [`PRIMARY_SOURCE`] entries.
pub const PRIMARY_SOURCE_NAME: &str = "hadPrimarySource";

/// Reverse reference from a metadata record to the object it describes.
pub const IS_METADATA_FOR: &str = "21.T11148/4fe7cde52629b61e3b82";

/// Display name for [`IS_METADATA_FOR`] entries.
pub const IS_METADATA_FOR_NAME: &str = "isMetadataFor";
