// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Lines starting with this marker are ignored by the reader.
pub const COMMENT_MARKER: char = '#';

#[derive(Debug, Error)]
pub enum BanFileError {
    /// The ban file does not exist (yet). Recoverable: the external ban
    /// tooling may simply not have produced it, so callers usually treat
    /// this as "no addresses banned".
    #[error("ban file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Any other I/O fault while opening or reading the file.
    #[error("failed to read ban file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads the ban file at `path` and returns the set of banned address
/// literals it contains, one per non-blank non-comment line.
///
/// Each line is trimmed and inserted verbatim; the reader does not validate
/// the literal (IPv4, IPv6 or CIDR are all passed through unchanged). The
/// file handle is released before returning.
pub fn read_ban_file(path: &Path) -> Result<HashSet<String>, BanFileError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BanFileError::NotFound { path: path.to_path_buf() });
        }
        Err(e) => {
            return Err(BanFileError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let mut entries = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| BanFileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with(COMMENT_MARKER) {
            continue;
        }
        entries.insert(entry.to_string());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_read_mixed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1.2.3.4\n#comment\n\n5.6.7.8").unwrap();

        let entries = read_ban_file(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains("1.2.3.4"));
        assert!(entries.contains("5.6.7.8"));
    }

    #[test]
    fn test_read_trims_whitespace_and_crlf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "  10.0.0.1  \r\n\t2001:db8::1\r\n192.168.0.0/16\n   \n").unwrap();

        let entries = read_ban_file(file.path()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.contains("10.0.0.1"));
        assert!(entries.contains("2001:db8::1"));
        assert!(entries.contains("192.168.0.0/16"));
    }

    #[test]
    fn test_read_duplicates_collapse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1.2.3.4\n1.2.3.4\n").unwrap();

        let entries = read_ban_file(file.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-banfile");

        match read_ban_file(&missing) {
            Err(BanFileError::NotFound { path }) => assert_eq!(path, missing),
            other => panic!("expected NotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_read_comment_only_file_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# banned by fail2ban\n#1.2.3.4\n").unwrap();

        let entries = read_ban_file(file.path()).unwrap();
        assert!(entries.is_empty());
    }
}
