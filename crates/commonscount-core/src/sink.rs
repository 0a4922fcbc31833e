//! Row sinks: append-only CSV tables and a discarding sink for dry runs

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bytes read per step when scanning a table backwards
const TAIL_CHUNK: usize = 8 * 1024;

/// One output row: header columns and their values, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.columns.push((column.into(), value.to_string()));
        self
    }

    pub fn header(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, v)| v.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Persistence sink consumed by the harvester
pub trait RowSink {
    /// Append `row` to `table`; the row is durable once this returns
    fn append_row(&mut self, table: &str, row: &Row) -> io::Result<()>;
}

impl<T: RowSink + ?Sized> RowSink for Box<T> {
    fn append_row(&mut self, table: &str, row: &Row) -> io::Result<()> {
        (**self).append_row(table, row)
    }
}

/// CSV tables under one directory, `<dir>/<table>.csv`.
///
/// The header is written once, when the file is created. Each row is
/// encoded in memory and appended with a single write. A row cut short by a
/// crash has no trailing newline; it is truncated away before the next
/// append to that table.
#[derive(Debug)]
pub struct CsvSink {
    dir: PathBuf,
    /// Tables whose header is known to be on disk
    ready: HashSet<String>,
    rows_written: usize,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        cleanup_tmp_files(&dir)?;
        Ok(Self {
            dir,
            ready: HashSet::new(),
            rows_written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    fn open_table(&mut self, table: &str, row: &Row) -> io::Result<File> {
        let path = self.table_path(table);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if !self.ready.contains(table) {
            truncate_torn_tail(&mut file, &path)?;
            if file.metadata()?.len() == 0 {
                log::debug!("Creating {}", path.display());
                file.write_all(&encode_record(row.header())?)?;
            }
            self.ready.insert(table.to_string());
        }
        Ok(file)
    }
}

impl RowSink for CsvSink {
    fn append_row(&mut self, table: &str, row: &Row) -> io::Result<()> {
        let mut file = self.open_table(table, row)?;
        file.write_all(&encode_record(row.values())?)?;
        file.flush()?;
        file.sync_data()?;
        self.rows_written += 1;
        Ok(())
    }
}

fn encode_record<'a>(fields: impl Iterator<Item = &'a str>) -> io::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(io::Error::other)?;
    writer.into_inner().map_err(|e| io::Error::other(e.to_string()))
}

/// Length of `file` up to and including its last `\n`
fn terminated_len(file: &mut File) -> io::Result<u64> {
    let mut end = file.metadata()?.len();
    let mut buf = [0u8; TAIL_CHUNK];
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// Drop an unterminated last line left behind by an interrupted write
fn truncate_torn_tail(file: &mut File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    let keep = terminated_len(file)?;
    if keep < len {
        log::warn!(
            "{}: dropping {} bytes of an interrupted row",
            path.display(),
            len - keep
        );
        file.set_len(keep)?;
    }
    Ok(())
}

/// Contents of a table up to its last complete row; empty if missing
pub fn read_complete_rows(path: &Path) -> io::Result<Vec<u8>> {
    let mut bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let keep = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1);
    bytes.truncate(keep);
    Ok(bytes)
}

/// Sink that drops every row (persistence disabled)
#[derive(Debug, Default)]
pub struct NullSink {
    rows_dropped: usize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows_dropped(&self) -> usize {
        self.rows_dropped
    }
}

impl RowSink for NullSink {
    fn append_row(&mut self, table: &str, row: &Row) -> io::Result<()> {
        log::debug!("{table}: {}", row.values().collect::<Vec<_>>().join(","));
        self.rows_dropped += 1;
        Ok(())
    }
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(index: usize, id: &str, count: u64) -> Row {
        Row::new()
            .with("PLAN_INDEX", index)
            .with("TOOL_IDENTIFIER", id)
            .with("COUNT", count)
    }

    #[test]
    fn header_written_once() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("gcs_1_count", &row(1, "CC0 1.0", 10)).unwrap();
        sink.append_row("gcs_1_count", &row(2, "CC BY 4.0", 20)).unwrap();

        let text = fs::read_to_string(sink.table_path("gcs_1_count")).unwrap();
        assert_eq!(
            text,
            "PLAN_INDEX,TOOL_IDENTIFIER,COUNT\n1,CC0 1.0,10\n2,CC BY 4.0,20\n"
        );
        assert_eq!(sink.rows_written(), 2);
    }

    #[test]
    fn reopening_appends_without_new_header() {
        let dir = TempDir::new().unwrap();
        {
            let mut sink = CsvSink::new(dir.path()).unwrap();
            sink.append_row("t", &row(1, "CC0 1.0", 10)).unwrap();
        }
        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("t", &row(2, "PDM 1.0", 5)).unwrap();

        let text = fs::read_to_string(sink.table_path("t")).unwrap();
        assert_eq!(text.matches("PLAN_INDEX").count(), 1);
        assert!(text.ends_with("2,PDM 1.0,5\n"));
    }

    #[test]
    fn torn_last_row_is_cut_before_appending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "PLAN_INDEX,TOOL_IDENTIFIER,COUNT\n1,CC0 1.0,10\n2,PDM 1").unwrap();

        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("t", &row(2, "PDM 1.0", 5)).unwrap();
        sink.append_row("t", &row(3, "CC BY 4.0", 7)).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "PLAN_INDEX,TOOL_IDENTIFIER,COUNT\n1,CC0 1.0,10\n2,PDM 1.0,5\n3,CC BY 4.0,7\n"
        );
    }

    #[test]
    fn torn_header_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "PLAN_IND").unwrap();

        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("t", &row(1, "CC0 1.0", 10)).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "PLAN_INDEX,TOOL_IDENTIFIER,COUNT\n1,CC0 1.0,10\n"
        );
    }

    #[test]
    fn torn_row_found_beyond_one_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let long = "x".repeat(3 * TAIL_CHUNK);
        fs::write(&path, format!("PLAN_INDEX,TOOL_IDENTIFIER,COUNT\n1,CC0 1.0,10\n2,{long}")).unwrap();

        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("t", &row(2, "PDM 1.0", 5)).unwrap();
        assert!(fs::read_to_string(&path).unwrap().ends_with("1,CC0 1.0,10\n2,PDM 1.0,5\n"));
    }

    #[test]
    fn complete_rows_exclude_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "A,B\n1,2\n3,").unwrap();
        assert_eq!(read_complete_rows(&path).unwrap(), b"A,B\n1,2\n");
        assert!(read_complete_rows(&dir.path().join("missing.csv")).unwrap().is_empty());
    }

    #[test]
    fn fields_are_quoted_when_needed() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("t", &row(1, "a,b", 1)).unwrap();
        let text = fs::read_to_string(sink.table_path("t")).unwrap();
        assert!(text.contains("1,\"a,b\",1\n"));
    }

    #[test]
    fn separate_tables_get_separate_files() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();
        sink.append_row("a", &row(1, "x", 1)).unwrap();
        sink.append_row("b", &row(2, "y", 2)).unwrap();
        assert!(sink.table_path("a").exists());
        assert!(sink.table_path("b").exists());
    }

    #[test]
    fn stale_tmp_files_removed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("state.yaml.tmp"), "x").unwrap();
        fs::write(dir.path().join("keep.csv"), "x").unwrap();
        CsvSink::new(dir.path()).unwrap();
        assert!(!dir.path().join("state.yaml.tmp").exists());
        assert!(dir.path().join("keep.csv").exists());
    }

    #[test]
    fn null_sink_counts() {
        let mut sink = NullSink::new();
        sink.append_row("t", &row(1, "x", 1)).unwrap();
        assert_eq!(sink.rows_dropped(), 1);
    }

    #[test]
    fn row_accessors() {
        let r = row(3, "CC0 1.0", 9);
        assert_eq!(r.get("COUNT"), Some("9"));
        assert_eq!(r.get("MISSING"), None);
        assert_eq!(r.header().collect::<Vec<_>>(), ["PLAN_INDEX", "TOOL_IDENTIFIER", "COUNT"]);
        assert_eq!(r.len(), 3);
    }
}
