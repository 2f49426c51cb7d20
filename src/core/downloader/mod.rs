mod client;
pub mod transport;

pub use client::{
    is_present_and_valid, sha1_bytes, sha1_file, BatchReport, DownloadEntry, Downloader,
    FetchStatus, RetryPolicy,
};
pub use transport::{Body, HttpTransport, Transport};
