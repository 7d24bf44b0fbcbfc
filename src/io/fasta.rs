use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;

use crate::alphabet::{self, Lcg, UnknownPolicy};

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

pub struct FastaReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    peek_header: Option<String>,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            peek_header: None,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }

        // Find header line
        let header = if let Some(h) = self.peek_header.take() {
            h
        } else {
            loop {
                self.buf.clear();
                let n = self.reader.read_line(&mut self.buf)?;
                if n == 0 {
                    self.done = true;
                    return Ok(None);
                }
                if self.buf.starts_with('>') {
                    let h = self.buf[1..].trim().to_string();
                    break h;
                }
            }
        };

        // Parse id and description
        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        // Read sequence lines
        let mut seq: Vec<u8> = Vec::new();
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf)?;
            if n == 0 {
                self.done = true;
                break;
            }
            if self.buf.starts_with('>') {
                let h = self.buf[1..].trim().to_string();
                self.peek_header = Some(h);
                break;
            }
            for &b in self.buf.as_bytes() {
                match b {
                    b'\n' | b'\r' | b' ' | b'\t' => {}
                    _ => seq.push(b.to_ascii_uppercase()),
                }
            }
        }

        Ok(Some(FastaRecord { id, desc, seq }))
    }
}

/// 一次性读入整个 FASTA 文件
pub fn read_all(path: &Path) -> Result<Vec<FastaRecord>> {
    let fh = std::fs::File::open(path)
        .with_context(|| format!("cannot open FASTA file '{}'", path.display()))?;
    let mut reader = FastaReader::new(std::io::BufReader::new(fh));
    let mut records = Vec::new();
    while let Some(rec) = reader.next_record()? {
        records.push(rec);
    }
    Ok(records)
}

/// 查询条目的元信息：名字 + 是否为反向互补方向
#[derive(Debug, Clone)]
pub struct QueryInfo {
    pub name: String,
    pub reverse: bool,
}

/// 读入查询文件并转换到排名空间。
/// `expand_revcomp` 为真时，每条记录额外产生一条反向互补查询，紧跟在正向之后。
pub fn load_rank_queries(
    path: &Path,
    policy: UnknownPolicy,
    expand_revcomp: bool,
) -> Result<(Vec<Vec<u8>>, Vec<QueryInfo>)> {
    let records = read_all(path)?;
    let mut rng = Lcg::new(0x5eed);
    let mut queries = Vec::with_capacity(records.len() * if expand_revcomp { 2 } else { 1 });
    let mut infos = Vec::with_capacity(queries.capacity());
    for rec in records {
        let ranks = alphabet::seq_to_ranks(&rec.seq, policy, &mut rng)
            .with_context(|| format!("query '{}'", rec.id))?;
        if expand_revcomp {
            let rc = alphabet::revcomp_ranks(&ranks);
            queries.push(ranks);
            infos.push(QueryInfo { name: rec.id.clone(), reverse: false });
            queries.push(rc);
            infos.push(QueryInfo { name: rec.id, reverse: true });
        } else {
            queries.push(ranks);
            infos.push(QueryInfo { name: rec.id, reverse: false });
        }
    }
    Ok((queries, infos))
}
