pub mod archive;
pub mod checksum;
