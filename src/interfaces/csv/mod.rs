pub mod range_reader;
pub mod summary_writer;
