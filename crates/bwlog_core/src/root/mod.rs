//! A log root: the directory shared by one writer and any number of readers.

mod active_files;
mod catalogs;
mod dir;
mod message;
mod reader;
mod writer;

pub use active_files::{ActiveFiles, ACTIVE_FILES};
pub use catalogs::Catalogs;
pub use dir::{LogRootDir, PidLock};
pub use message::LogMessage;
pub use reader::{LogRootReader, UserInfo};
pub use writer::{LogRootWriter, WriterEnv};
