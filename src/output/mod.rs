use colored::Colorize;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::command::{CommandError, CommandRunner};

const BANNER: &str = "------------------------------";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write changelog file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to convert changelog to reStructuredText: {0}")]
    Convert(#[from] CommandError),
}

/// Convert markdown to reStructuredText with `pandoc`.
#[instrument(skip_all, fields(markdown_bytes = markdown.len()))]
pub async fn convert_to_rst(runner: &dyn CommandRunner, markdown: &str) -> Result<String, OutputError> {
    let mut source = tempfile::Builder::new()
        .prefix("changelog-")
        .suffix(".md")
        .tempfile()?;
    source.write_all(markdown.as_bytes())?;
    source.flush()?;

    let path = source.path().to_string_lossy().into_owned();
    let rst = runner
        .run("pandoc", &["--from", "markdown", "--to", "rst", &path], None)
        .await?;
    debug!(rst_bytes = rst.len(), "converted");
    Ok(rst)
}

/// Print the changelog between banners, then write it (without banners)
/// to `path` when one is given.
#[instrument(skip(changelog))]
pub fn emit(changelog: &str, path: Option<&Path>) -> Result<(), OutputError> {
    print_console(changelog);
    match path {
        None => Ok(()),
        Some(path) => {
            debug!(path = %path.display(), "writing changelog file");
            write_file(changelog, path)
        }
    }
}

fn print_console(changelog: &str) {
    println!();
    println!("{}", BANNER.bold());
    println!("{changelog}");
    println!("{}", BANNER.bold());
    println!();
}

fn write_file(changelog: &str, path: &Path) -> Result<(), OutputError> {
    std::fs::write(path, changelog)?;
    Ok(())
}
