//! Packed stream records, the format exchanged between a dump with
//! contents and the materialization engine.
//!
//! ```text
//! <op><type> <perm-octal> <uid> <gid> <name_len> <size>\n<name>[<content>]
//! ```
//!
//! For symlinks (`l`) and hardlinks (`h`) the name buffer holds
//! `source -> target` and `size` is the byte length of `source`. Content
//! bytes follow only for added regular files, exactly `size` of them.

use std::io::{self, BufRead, Read, Write};
use thiserror::Error;

use super::{path_from_bytes, Entry, Kind, Link, Op, Record, LINK_DELIMITER, PERMISSION_MASK};
use nix::sys::stat::SFlag;

/// Upper bound for a name buffer: two maximal paths plus the delimiter.
pub const MAX_NAME_LEN: usize = 2 * 4096 + 4;

/// Upper bound for a header line, newline included. Six fields of at most
/// twenty digits each fit with room to spare.
pub const MAX_HEADER_LEN: usize = 160;

#[derive(Error, Debug)]
pub enum PackedError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("stream truncated inside record {0}")]
    Truncated(&'static str),

    #[error("malformed record header `{0}`")]
    BadHeader(String),

    #[error("name length {0} exceeds {MAX_NAME_LEN} bytes")]
    NameTooLong(usize),

    #[error("link record `{name}` has no ` -> ` at offset {offset}")]
    MissingLinkDelimiter { name: String, offset: usize },
}

/// Split a combined link name into `(source, target)`.
///
/// `size` is the byte length of the source; the target starts right after
/// the four delimiter bytes.
pub fn split_link_name(name: &[u8], size: usize) -> Result<(&[u8], &[u8]), PackedError> {
    let end = size
        .checked_add(LINK_DELIMITER.len())
        .filter(|&end| end <= name.len());

    match end {
        Some(end) if &name[size..end] == LINK_DELIMITER => Ok((&name[..size], &name[end..])),
        _ => Err(PackedError::MissingLinkDelimiter {
            name: String::from_utf8_lossy(name).into_owned(),
            offset: size,
        }),
    }
}

#[derive(Debug)]
struct Header {
    op: Op,
    kind: u8,
    permissions: u32,
    uid: u32,
    gid: u32,
    name_len: usize,
    size: u64,
}

fn type_char(kind: Kind) -> u8 {
    match kind {
        Kind::File => b'-',
        Kind::Directory => b'd',
        Kind::Symlink => b'l',
        Kind::Hardlink => b'h',
        Kind::Other => b'o',
    }
}

fn type_flag(kind: u8) -> Option<SFlag> {
    match kind {
        b'-' | b'h' => Some(SFlag::S_IFREG),
        b'd' => Some(SFlag::S_IFDIR),
        b'l' => Some(SFlag::S_IFLNK),
        _ => None,
    }
}

fn parse_header(line: &[u8]) -> Result<Header, PackedError> {
    let bad = || PackedError::BadHeader(String::from_utf8_lossy(line).into_owned());

    let text = std::str::from_utf8(line).map_err(|_| bad())?;
    let fields: Vec<&str> = text.split(' ').collect();
    if fields.len() != 6 || fields[0].len() != 2 {
        return Err(bad());
    }

    let tag = fields[0].as_bytes();
    let op = match tag[0] {
        b'+' => Op::Add,
        b'-' => Op::Remove,
        _ => return Err(bad()),
    };
    if !matches!(tag[1], b'-' | b'd' | b'l' | b'h' | b'o') {
        return Err(bad());
    }

    Ok(Header {
        op,
        kind: tag[1],
        permissions: u32::from_str_radix(fields[1], 8).map_err(|_| bad())? & PERMISSION_MASK,
        uid: fields[2].parse().map_err(|_| bad())?,
        gid: fields[3].parse().map_err(|_| bad())?,
        name_len: fields[4].parse().map_err(|_| bad())?,
        size: fields[5].parse().map_err(|_| bad())?,
    })
}

fn build_entry(header: &Header, name: &[u8]) -> Result<Entry, PackedError> {
    let type_bits = type_flag(header.kind).map(|f| f.bits() as u32).unwrap_or(0);
    let mode = type_bits | header.permissions;

    let mut entry = match header.kind {
        // Removals rebuilt from a snapshot know only the link's own path.
        b'l' | b'h' if header.op == Op::Remove && header.size == name.len() as u64 => {
            Entry::new(path_from_bytes(name), mode)
        }
        b'l' | b'h' => {
            let size = usize::try_from(header.size).unwrap_or(usize::MAX);
            let (source, target) = split_link_name(name, size)?;
            let target = path_from_bytes(target);
            let mut entry = Entry::new(path_from_bytes(source), mode);
            entry.link = Some(if header.kind == b'l' {
                Link::Symbolic(target)
            } else {
                Link::Hard(target)
            });
            entry
        }
        _ => Entry::new(path_from_bytes(name), mode),
    };

    entry.size = header.size;
    entry.uid = Some(header.uid);
    entry.gid = Some(header.gid);
    Ok(entry)
}

/// Whether a record is followed by `size` content bytes.
pub fn carries_content(record: &Record) -> bool {
    record.op == Op::Add && record.entry.kind() == Kind::File
}

/// Decodes records one at a time. Content bytes of regular files are left
/// in the stream for the caller to consume through [`PackedReader::content`].
pub struct PackedReader<R> {
    inner: R,
    header: Vec<u8>,
}

impl<R: BufRead> PackedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header: Vec::with_capacity(64),
        }
    }

    /// Next record, or `None` at a clean end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, PackedError> {
        self.header.clear();
        let read = (&mut self.inner)
            .take(MAX_HEADER_LEN as u64)
            .read_until(b'\n', &mut self.header)?;
        if read == 0 {
            return Ok(None);
        }
        if self.header.last() != Some(&b'\n') {
            if read == MAX_HEADER_LEN {
                return Err(PackedError::BadHeader(format!(
                    "{}... (no newline in {} bytes)",
                    String::from_utf8_lossy(&self.header[..32]),
                    MAX_HEADER_LEN
                )));
            }
            return Err(PackedError::Truncated("header"));
        }
        self.header.pop();

        let header = parse_header(&self.header)?;
        if header.name_len > MAX_NAME_LEN {
            return Err(PackedError::NameTooLong(header.name_len));
        }

        let mut name = vec![0u8; header.name_len];
        self.inner.read_exact(&mut name).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => PackedError::Truncated("name"),
            _ => PackedError::Io(e),
        })?;

        let entry = build_entry(&header, &name)?;
        Ok(Some(Record {
            op: header.op,
            entry,
        }))
    }

    /// The underlying stream, positioned at the content of the last record.
    pub fn content(&mut self) -> &mut R {
        &mut self.inner
    }
}

/// Encoder side of the packed format.
pub struct PackedWriter<W> {
    inner: W,
}

impl<W: Write> PackedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Header line and name buffer of a record. Content, if any, must follow
    /// through [`PackedWriter::write_content`].
    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        let entry = &record.entry;
        let name = entry.combined_name();
        let size = match entry.kind() {
            Kind::Symlink | Kind::Hardlink => entry.path_bytes().len() as u64,
            _ => entry.size,
        };
        let op = match record.op {
            Op::Add => '+',
            Op::Remove => '-',
        };

        writeln!(
            self.inner,
            "{}{} {:o} {} {} {} {}",
            op,
            type_char(entry.kind()) as char,
            entry.permissions(),
            entry.uid.unwrap_or(0),
            entry.gid.unwrap_or(0),
            name.len(),
            size,
        )?;
        self.inner.write_all(&name)
    }

    /// Copy exactly `size` bytes of content. A source shorter than `size` is
    /// padded with zeros so the stream stays aligned; returns the number of
    /// bytes actually taken from `content`.
    pub fn write_content<R: Read>(&mut self, content: R, size: u64) -> io::Result<u64> {
        let copied = io::copy(&mut content.take(size), &mut self.inner)?;
        if copied < size {
            io::copy(&mut io::repeat(0).take(size - copied), &mut self.inner)?;
        }
        Ok(copied)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
