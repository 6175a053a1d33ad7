use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Reads a corpus text file and returns its non-blank lines.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
/// - Lines made only of whitespace are dropped (they carry no tokens)
pub fn read_corpus<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let contents = fs::read_to_string(filename)?;
	Ok(contents
		.lines()
		.filter(|line| !line.trim().is_empty())
		.map(str::to_owned)
		.collect())
}

/// Builds the path of the cached model for a corpus file and model order.
///
/// Example:
/// `data/diary.txt` + order 5 → `data/diary.o5.bin`
pub fn model_cache_path<P: AsRef<Path>>(input_path: P, order: usize) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut name = file_stem.to_os_string();
	name.push(format!(".o{order}.bin"));
	Ok(parent.join(name))
}

/// Lists all files with a given extension in a directory, sorted by name.
///
/// Returns full paths. Subdirectories are ignored.
pub fn list_corpus_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<PathBuf>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		if path.is_file() && path.extension() == Some(std::ffi::OsStr::new(extension)) {
			files.push(path);
		}
	}

	files.sort();
	Ok(files)
}
