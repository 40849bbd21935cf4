use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, trace, warn};
use serde::Serialize;

#[cfg(feature = "multithreading")]
use rayon::prelude::*;

use crate::algorithm::{AlgorithmId, AlgorithmIdList};
use crate::decode::{LogOptions, decode_event_data};
use crate::decoders::tcg::{Spec, SpecIdEvent};
use crate::digest::{Digest, DigestMap};
use crate::err::{LogError, Result};
use crate::event::Event;
use crate::event_type::{EventType, PcrIndex};

/// Firmware measures this value in place of a separator when it hits an error.
const SEPARATOR_ERROR_VALUE: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SHA1_DIGEST_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserSettings {
    /// 0 means one thread per core.
    num_threads: usize,
    index_base: u32,
    log_options: LogOptions,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            num_threads: 0,
            index_base: 0,
            log_options: LogOptions::default(),
        }
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    /// Sets the number of worker threads used to decode event data.
    /// `0` will let rayon decide. Ignored without the `multithreading` feature.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// The index assigned to the first record of the log.
    pub fn index_base(mut self, index_base: u32) -> Self {
        self.index_base = index_base;
        self
    }

    pub fn log_options(mut self, log_options: LogOptions) -> Self {
        self.log_options = log_options;
        self
    }

    pub fn get_num_threads(&self) -> usize {
        if cfg!(feature = "multithreading") {
            self.num_threads
        } else {
            1
        }
    }

    pub fn get_index_base(&self) -> u32 {
        self.index_base
    }

    pub fn get_log_options(&self) -> &LogOptions {
        &self.log_options
    }
}

/// A fully decoded event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Log {
    pub spec: Spec,
    /// The digest algorithms every record carries, in header order.
    pub algorithms: AlgorithmIdList,
    pub events: Vec<Event>,
}

/// A record whose framing was read, but whose data is yet to be decoded.
struct RawRecord<'a> {
    index: u32,
    pcr_index: PcrIndex,
    event_type: EventType,
    digests: DigestMap,
    data: &'a [u8],
    separator_digest_error: bool,
}

/// The digest algorithms of a log, and the size of each digest in a record.
struct DigestLayout {
    algorithms: Vec<(AlgorithmId, usize)>,
    /// Hash of [`SEPARATOR_ERROR_VALUE`] under the first supported algorithm.
    separator_error_digest: Option<(AlgorithmId, Vec<u8>)>,
}

impl DigestLayout {
    fn new(algorithms: Vec<(AlgorithmId, usize)>) -> Self {
        let separator_error_digest = algorithms.iter().find_map(|&(alg, _)| {
            alg.hash(&SEPARATOR_ERROR_VALUE)
                .map(|digest| (alg, digest))
        });

        DigestLayout {
            algorithms,
            separator_error_digest,
        }
    }

    fn sha1_only() -> Self {
        DigestLayout::new(vec![(AlgorithmId::SHA1, SHA1_DIGEST_SIZE)])
    }

    fn size_of(&self, algorithm: AlgorithmId) -> Option<usize> {
        self.algorithms
            .iter()
            .find(|(alg, _)| *alg == algorithm)
            .map(|&(_, size)| size)
    }

    fn is_separator_error(&self, digests: &DigestMap) -> bool {
        match &self.separator_error_digest {
            Some((alg, expected)) => digests
                .get(alg)
                .is_some_and(|d| d.as_bytes() == expected.as_slice()),
            None => false,
        }
    }
}

pub struct TcgLogParser {
    data: Vec<u8>,
    config: Arc<ParserSettings>,
}

impl TcgLogParser {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| LogError::FailedToOpenFile {
            source: e,
            path: path.to_path_buf(),
        })?;

        Self::from_read(f)
    }

    pub fn from_read<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_buffer(data))
    }

    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        TcgLogParser {
            data: buffer,
            config: Arc::new(ParserSettings::default()),
        }
    }

    pub fn with_configuration(mut self, configuration: ParserSettings) -> Self {
        self.config = Arc::new(configuration);
        self
    }

    /// Reads every record of the log and decodes its data.
    ///
    /// Errors in the record framing abort the parse, since the following record boundaries
    /// can no longer be trusted. Event data that cannot be decoded does not.
    pub fn parse_log(&self) -> Result<Log> {
        if self.data.is_empty() {
            return Err(LogError::EmptyLog);
        }
        info!("Parsing a {} byte event log", self.data.len());

        let mut cursor = Cursor::new(self.data.as_slice());
        let index_base = self.config.get_index_base();

        // The first record always uses the TCG 1.2 format, even in crypto agile logs.
        let header = read_record(&mut cursor, index_base, &DigestLayout::sha1_only(), false)?;
        let (spec, layout) = detect_format(&header)?;
        debug!(
            "Detected a {} log with algorithms {:?}",
            spec,
            layout.algorithms.iter().map(|(a, _)| a.to_string()).collect::<Vec<_>>()
        );

        let mut records = vec![header];
        let mut index = index_base;
        while (cursor.position() as usize) < self.data.len() {
            index = index.wrapping_add(1);
            records.push(read_record(
                &mut cursor,
                index,
                &layout,
                spec.is_crypto_agile(),
            )?);
        }
        info!("Read {} records", records.len());

        let events = self.decode_records(records);

        Ok(Log {
            spec,
            algorithms: layout.algorithms.iter().map(|&(alg, _)| alg).collect(),
            events,
        })
    }

    #[cfg(feature = "multithreading")]
    fn decode_records(&self, records: Vec<RawRecord>) -> Vec<Event> {
        let num_threads = self.config.get_num_threads();
        if num_threads == 1 {
            return self.decode_records_sequential(records);
        }

        match rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
        {
            Ok(pool) => pool.install(|| {
                records
                    .into_par_iter()
                    .map(|r| decode_record(r, self.config.get_log_options()))
                    .collect()
            }),
            Err(e) => {
                warn!("Failed to create a thread pool, decoding sequentially: {}", e);
                self.decode_records_sequential(records)
            }
        }
    }

    #[cfg(not(feature = "multithreading"))]
    fn decode_records(&self, records: Vec<RawRecord>) -> Vec<Event> {
        self.decode_records_sequential(records)
    }

    fn decode_records_sequential(&self, records: Vec<RawRecord>) -> Vec<Event> {
        records
            .into_iter()
            .map(|r| decode_record(r, self.config.get_log_options()))
            .collect()
    }
}

fn decode_record(record: RawRecord, options: &LogOptions) -> Event {
    let (data, _) = decode_event_data(
        record.pcr_index,
        record.event_type,
        record.data,
        options,
        record.separator_digest_error,
    );
    Event::new(
        record.index,
        record.pcr_index,
        record.event_type,
        record.digests,
        data,
    )
}

/// Decides the log format from its first record.
fn detect_format(header: &RawRecord) -> Result<(Spec, DigestLayout)> {
    if header.pcr_index != 0 || header.event_type != EventType::NO_ACTION {
        return Ok((Spec::Unknown, DigestLayout::sha1_only()));
    }

    let spec_id = match SpecIdEvent::decode(header.data) {
        Ok(Some((spec_id, _))) => spec_id,
        Ok(None) => return Ok((Spec::Unknown, DigestLayout::sha1_only())),
        Err(e) => return Err(LogError::InvalidHeader { source: e }),
    };

    if !spec_id.spec.is_crypto_agile() {
        return Ok((spec_id.spec, DigestLayout::sha1_only()));
    }

    let mut algorithms = Vec::with_capacity(spec_id.digest_sizes.len());
    for declared in &spec_id.digest_sizes {
        let alg = declared.algorithm_id;
        let size = usize::from(declared.digest_size);
        if alg.is_supported() && alg.digest_size() != size {
            return Err(LogError::DigestSizeMismatch {
                algorithm: alg,
                declared: declared.digest_size,
                expected: alg.digest_size(),
            });
        }
        if !alg.is_supported() {
            warn!(
                "Log declares unsupported algorithm {}, its digests are kept as is",
                alg
            );
        }
        algorithms.push((alg, size));
    }

    Ok((spec_id.spec, DigestLayout::new(algorithms)))
}

fn take<'a>(
    cursor: &mut Cursor<&'a [u8]>,
    len: usize,
    index: u32,
    what: &'static str,
) -> Result<&'a [u8]> {
    let buf: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or(LogError::TruncatedRecord {
            index,
            what,
            offset: start as u64,
        })?;
    cursor.set_position(end as u64);
    Ok(&buf[start..end])
}

fn read_record<'a>(
    cursor: &mut Cursor<&'a [u8]>,
    index: u32,
    layout: &DigestLayout,
    crypto_agile: bool,
) -> Result<RawRecord<'a>> {
    let record_offset = cursor.position();
    let pcr_index = try_read!(cursor, u32, index, "PCR index");
    let event_type = EventType(try_read!(cursor, u32, index, "event type"));

    let mut digests = DigestMap::new();
    if crypto_agile {
        let count_offset = cursor.position();
        let count = try_read!(cursor, u32, index, "digest count");
        if count as usize != layout.algorithms.len() {
            return Err(LogError::DigestCountMismatch {
                index,
                found: count,
                expected: layout.algorithms.len(),
                offset: count_offset,
            });
        }

        for _ in 0..count {
            let alg_offset = cursor.position();
            let alg = AlgorithmId(try_read!(cursor, u16, index, "digest algorithm"));
            let size = layout
                .size_of(alg)
                .ok_or(LogError::UndeclaredAlgorithm {
                    index,
                    pcr_index,
                    algorithm: alg,
                    offset: alg_offset,
                })?;
            let digest = take(cursor, size, index, "digest")?;
            if digests.insert(alg, Digest::new(digest)).is_some() {
                return Err(LogError::DuplicateDigest {
                    index,
                    pcr_index,
                    algorithm: alg,
                    offset: alg_offset,
                });
            }
        }
    } else {
        let digest = take(cursor, SHA1_DIGEST_SIZE, index, "digest")?;
        digests.insert(AlgorithmId::SHA1, Digest::new(digest));
    }

    let data_size = try_read!(cursor, u32, index, "event data size");
    let data = take(cursor, data_size as usize, index, "event data")?;

    let separator_digest_error =
        event_type == EventType::SEPARATOR && layout.is_separator_error(&digests);

    trace!(
        "Offset {}: record {} PCR {} {} with {} bytes of data",
        record_offset,
        index,
        pcr_index,
        event_type,
        data.len()
    );

    Ok(RawRecord {
        index,
        pcr_index,
        event_type,
        digests,
        data,
        separator_digest_error,
    })
}
