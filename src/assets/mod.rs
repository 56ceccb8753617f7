mod downloader;
mod localizer;
mod reaper;

#[cfg(test)]
pub(crate) mod testing;

pub use downloader::{Download, HttpDownloader};
pub use localizer::Localizer;
pub use reaper::Reaper;
