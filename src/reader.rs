//! Tail Reader — extracts the last N lines of a file, and lines appended
//! since a given byte offset, without materializing the whole file.
//!
//! `last_lines` performs a backward block scan (the "shift on overflow"
//! strategy spec.md §9 permits); `lines_since` seeks to the nearest line
//! boundary at or before the requested offset and reads forward from
//! there, the way `tail.rs`'s `find_line_boundary` searches forward for a
//! boundary but mirrored to the direction we actually need here.

use crate::error::TailError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Split `buf` on LF, stripping a trailing CR from each line. Returns the
/// lines found and whether `buf` ended with a terminator (if not, the
/// final element of `buf` split is an unterminated fragment and must not
/// be treated as a line).
fn split_terminated(buf: &[u8]) -> (Vec<String>, bool) {
    if buf.is_empty() {
        return (Vec::new(), true);
    }
    let ends_with_terminator = buf.last() == Some(&b'\n');
    let mut lines: Vec<String> = buf
        .split(|&b| b == b'\n')
        .map(|segment| {
            let segment = if segment.last() == Some(&b'\r') {
                &segment[..segment.len() - 1]
            } else {
                segment
            };
            String::from_utf8_lossy(segment).into_owned()
        })
        .collect();
    // `split` on a terminator-ending buffer yields a trailing empty
    // segment (the bytes after the final '\n'); drop it, it is not a line.
    if ends_with_terminator {
        lines.pop();
    }
    (lines, ends_with_terminator)
}

/// Returns the last `n` terminated lines of the file at `path`, oldest
/// first, plus the file's size in bytes at the moment reading completes.
///
/// Peak auxiliary memory is bounded by `n * max_line_bytes` plus one
/// read-block buffer, independent of total file size: the file is
/// scanned backward in fixed-size blocks and only the trailing window of
/// lines found so far is retained.
pub fn last_lines(path: &Path, n: usize, block_size: usize) -> Result<(Vec<String>, u64), TailError> {
    let mut file = File::open(path).map_err(|e| TailError::from_io(path, e))?;
    let file_len = file.metadata().map_err(|e| TailError::from_io(path, e))?.len();

    if file_len == 0 || n == 0 {
        return Ok((Vec::new(), file_len));
    }

    let mut pos = file_len;
    let mut remainder: Vec<u8> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut first_block = true;

    while pos > 0 && lines.len() <= n {
        let read_len = (block_size as u64).min(pos) as usize;
        pos -= read_len as u64;
        file.seek(SeekFrom::Start(pos)).map_err(|e| TailError::from_io(path, e))?;
        let mut chunk = vec![0u8; read_len];
        file.read_exact(&mut chunk).map_err(|e| TailError::from_io(path, e))?;
        chunk.extend_from_slice(&remainder);
        let mut combined = chunk;

        if first_block {
            // Drop an unterminated trailing fragment: it is not yet a
            // published line (invariant in spec.md §3).
            if combined.last() != Some(&b'\n') {
                match combined.iter().rposition(|&b| b == b'\n') {
                    Some(idx) => combined.truncate(idx + 1),
                    None => combined.clear(),
                }
            }
            first_block = false;
        }

        let (mut segments, _) = split_terminated(&combined);

        if pos > 0 {
            // The earliest segment may be a partial line spanning further
            // back in the file; carry it forward as `remainder` rather
            // than treating it as a complete line.
            remainder = if segments.is_empty() {
                combined
            } else {
                segments.remove(0).into_bytes()
            };
        } else {
            remainder = Vec::new();
        }

        // Prepend this block's complete lines (in their file order)
        // ahead of lines already accumulated from later blocks.
        segments.extend(lines);
        lines = segments;
    }

    if lines.len() > n {
        let drop = lines.len() - n;
        lines.drain(0..drop);
    }

    Ok((lines, file_len))
}

/// Find the byte offset of the start of the line containing (or
/// immediately following) `offset`: the position right after the nearest
/// preceding `'\n'`, or 0 if none exists before `offset`.
fn find_line_start(file: &mut File, path: &Path, offset: u64, block_size: usize) -> Result<u64, TailError> {
    if offset == 0 {
        return Ok(0);
    }
    let mut pos = offset;
    loop {
        let block_start = pos.saturating_sub(block_size as u64);
        let read_len = (pos - block_start) as usize;
        file.seek(SeekFrom::Start(block_start)).map_err(|e| TailError::from_io(path, e))?;
        let mut buf = vec![0u8; read_len];
        file.read_exact(&mut buf).map_err(|e| TailError::from_io(path, e))?;
        if let Some(idx) = buf.iter().rposition(|&b| b == b'\n') {
            return Ok(block_start + idx as u64 + 1);
        }
        if block_start == 0 {
            return Ok(0);
        }
        pos = block_start;
    }
}

/// Returns every terminated line whose terminator lies strictly after
/// byte `from_offset`, in file order, plus the file's size at completion.
///
/// `new_offset` is always the file's size at the moment of the call, even
/// if the tail of the file is an unterminated fragment — that fragment is
/// re-scanned (and delivered exactly once) on the next call once its
/// terminator lands, per spec.md §4.A.
pub fn lines_since(path: &Path, from_offset: u64, block_size: usize) -> Result<(Vec<String>, u64), TailError> {
    let mut file = File::open(path).map_err(|e| TailError::from_io(path, e))?;
    let file_len = file.metadata().map_err(|e| TailError::from_io(path, e))?.len();

    if file_len <= from_offset {
        return Ok((Vec::new(), file_len));
    }

    let read_start = find_line_start(&mut file, path, from_offset, block_size)?;

    file.seek(SeekFrom::Start(read_start)).map_err(|e| TailError::from_io(path, e))?;
    let mut buf = vec![0u8; (file_len - read_start) as usize];
    file.read_exact(&mut buf).map_err(|e| TailError::from_io(path, e))?;

    // Only emit lines whose terminator sits strictly after `from_offset`;
    // this excludes a line that was already fully delivered before
    // `from_offset` was recorded (the common case where `read_start ==
    // from_offset` emits everything, since every terminator in `buf` is
    // then necessarily past `from_offset`). A fragment that straddled
    // `from_offset` on a prior call (read_start < from_offset) is
    // re-delivered whole now that its terminator has landed.
    let mut out = Vec::new();
    let mut line_start = 0usize;
    for i in 0..buf.len() {
        if buf[i] == b'\n' {
            let terminator_pos = read_start + i as u64;
            let mut end = i;
            if end > line_start && buf[end - 1] == b'\r' {
                end -= 1;
            }
            if terminator_pos > from_offset {
                out.push(String::from_utf8_lossy(&buf[line_start..end]).into_owned());
            }
            line_start = i + 1;
        }
    }

    Ok((out, file_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_with(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn empty_file_yields_nothing() {
        let f = temp_with("");
        let (lines, offset) = last_lines(f.path(), 10, 64 * 1024).unwrap();
        assert!(lines.is_empty());
        assert_eq!(offset, 0);
    }

    #[test]
    fn fewer_lines_than_requested_returns_all() {
        let f = temp_with("Line 1\nLine 2\n");
        let (lines, offset) = last_lines(f.path(), 10, 64 * 1024).unwrap();
        assert_eq!(lines, vec!["Line 1", "Line 2"]);
        assert_eq!(offset, 14);
    }

    #[test]
    fn last_n_of_many_lines_in_file_order() {
        let mut contents = String::new();
        for i in 1..=50 {
            contents.push_str(&format!("Line {i}: entry {i}\n"));
        }
        let f = temp_with(&contents);
        let (lines, offset) = last_lines(f.path(), 10, 64 * 1024).unwrap();
        let expected: Vec<String> = (41..=50).map(|i| format!("Line {i}: entry {i}")).collect();
        assert_eq!(lines, expected);
        assert_eq!(offset, contents.len() as u64);
    }

    #[test]
    fn last_n_holds_across_tiny_block_size() {
        // Force many block-scan iterations by using a block size much
        // smaller than a single line, to exercise the carry-forward path.
        let mut contents = String::new();
        for i in 1..=50 {
            contents.push_str(&format!("Line {i}: entry {i}\n"));
        }
        let f = temp_with(&contents);
        let (lines, _offset) = last_lines(f.path(), 10, 8).unwrap();
        let expected: Vec<String> = (41..=50).map(|i| format!("Line {i}: entry {i}")).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn unterminated_trailing_fragment_is_ignored() {
        let f = temp_with("a\nb");
        let (lines, _offset) = last_lines(f.path(), 10, 64 * 1024).unwrap();
        assert_eq!(lines, vec!["a"]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = last_lines(Path::new("/no/such/file-xyz"), 10, 64 * 1024).unwrap_err();
        assert!(matches!(err, TailError::NotFound(_)));
    }

    #[test]
    fn lines_since_returns_new_lines_after_offset() {
        let f = temp_with("Initial line\n");
        let offset = 13;
        let mut file = std::fs::OpenOptions::new().append(true).open(f.path()).unwrap();
        file.write_all(b"New line 1\nNew line 2\n").unwrap();
        drop(file);

        let (lines, new_offset) = lines_since(f.path(), offset, 64 * 1024).unwrap();
        assert_eq!(lines, vec!["New line 1", "New line 2"]);
        assert_eq!(new_offset, 13 + 23);
    }

    #[test]
    fn lines_since_at_or_past_file_size_is_empty() {
        let f = temp_with("only line\n");
        let len = f.as_file().metadata().unwrap().len();
        let (lines, new_offset) = lines_since(f.path(), len, 64 * 1024).unwrap();
        assert!(lines.is_empty());
        assert_eq!(new_offset, len);
    }

    #[test]
    fn lines_since_redelivers_a_fragment_completed_after_the_recorded_offset() {
        let f = temp_with("a\nb");
        let (_lines, recorded_offset) = last_lines(f.path(), 10, 64 * 1024).unwrap();
        assert_eq!(recorded_offset, 3);

        let mut file = std::fs::OpenOptions::new().append(true).open(f.path()).unwrap();
        file.write_all(b"c\n").unwrap();
        drop(file);

        let (lines, _new_offset) = lines_since(f.path(), recorded_offset, 64 * 1024).unwrap();
        assert_eq!(lines, vec!["bc"]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let f = temp_with("one\r\ntwo\r\n");
        let (lines, _offset) = last_lines(f.path(), 10, 64 * 1024).unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }
}
