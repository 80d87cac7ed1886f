pub mod metadata_tags;
pub mod tag_writer;
