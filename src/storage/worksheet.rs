use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::crawler::task::URL_HEADER;
use crate::storage::{ResultSink, SinkError};

/// Worksheet stored as a CSV file: `<root>/<spreadsheet>/<worksheet>.csv`
#[derive(Debug, Clone)]
pub struct CsvWorksheet {
    path: PathBuf,
}

impl CsvWorksheet {
    /// Open a worksheet, creating the spreadsheet directory and the file when missing
    pub fn open(root: &Path, spreadsheet: &str, worksheet: &str) -> Result<Self, SinkError> {
        let dir = root.join(spreadsheet);
        fs::create_dir_all(&dir).map_err(|source| SinkError::Provisioning {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("{}.csv", worksheet));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Provisioning {
                path: path.clone(),
                source,
            })?;

        info!("Using worksheet {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<csv::StringRecord>, SinkError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        Ok(reader.records().collect::<Result<Vec<_>, _>>()?)
    }

    fn read_urls(&self) -> Result<HashSet<String>, SinkError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let url_idx = match reader.headers()?.iter().position(|h| h == URL_HEADER) {
            Some(idx) => idx,
            None => return Err(SinkError::MissingColumn(URL_HEADER.to_string())),
        };

        let mut urls = HashSet::new();
        for record in reader.records() {
            if let Some(url) = record?.get(url_idx).filter(|url| !url.is_empty()) {
                urls.insert(url.to_string());
            }
        }

        Ok(urls)
    }

    /// Writer positioned at the end of the file, always at the start of a line
    fn appender(&self) -> Result<csv::Writer<File>, SinkError> {
        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        if ends_mid_line(&mut file)? {
            debug!("Terminating unfinished last line of {}", self.path.display());
            file.write_all(b"\n")?;
        }
        Ok(csv::Writer::from_writer(file))
    }

    /// Rewrite the whole file with a new first row, keeping the data rows
    fn replace_header(&self, headers: &[String], rows: &[csv::StringRecord]) -> Result<(), SinkError> {
        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp_path)?;
            writer.write_record(headers)?;
            for row in rows.iter().skip(1) {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn write_headers(&self, headers: &[String]) -> Result<(), SinkError> {
        let rows = self.read_rows()?;

        match rows.first() {
            Some(current) if current.iter().eq(headers.iter().map(String::as_str)) => {
                debug!("Header row already in place");
            }
            None => {
                let mut writer = self.appender()?;
                writer.write_record(headers)?;
                writer.flush()?;
                info!("Wrote header row to {}", self.path.display());
            }
            Some(current) => {
                warn!(
                    "Replacing unexpected header row {:?} in {}",
                    current.iter().collect::<Vec<_>>(),
                    self.path.display()
                );
                self.replace_header(headers, &rows)?;
            }
        }

        Ok(())
    }

    fn write_rows(&self, rows: &[Vec<String>]) -> Result<(), SinkError> {
        let mut writer = self.appender()?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

// File and CSV I/O is blocking; it runs on the blocking pool
#[async_trait]
impl ResultSink for CsvWorksheet {
    async fn ensure_headers(&self, headers: &[&str]) -> Result<(), SinkError> {
        let sheet = self.clone();
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();

        tokio::task::spawn_blocking(move || sheet.write_headers(&headers)).await?
    }

    async fn existing_urls(&self) -> HashSet<String> {
        let sheet = self.clone();
        let result = match tokio::task::spawn_blocking(move || sheet.read_urls()).await {
            Ok(result) => result,
            Err(e) => Err(SinkError::from(e)),
        };

        match result {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Failed reading existing URLs; continuing with empty set: {}", e);
                HashSet::new()
            }
        }
    }

    async fn append_rows(
        &self,
        headers: &[&str],
        rows: Vec<Vec<String>>,
        existing: &HashSet<String>,
    ) -> Result<usize, SinkError> {
        let url_idx = headers.iter()
            .position(|h| *h == URL_HEADER)
            .ok_or_else(|| SinkError::MissingColumn(URL_HEADER.to_string()))?;

        let filtered: Vec<Vec<String>> = rows.into_iter()
            .filter(|row| row.get(url_idx).map_or(true, |url| !existing.contains(url)))
            .collect();

        if filtered.is_empty() {
            info!("No new rows to append. Skipping update.");
            return Ok(0);
        }

        let count = filtered.len();
        let sheet = self.clone();
        tokio::task::spawn_blocking(move || sheet.write_rows(&filtered)).await??;

        info!("Appended {} new rows.", count);
        Ok(count)
    }
}
