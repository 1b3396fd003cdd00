//! Signed, chunked archive container ("vwad"). No off-the-shelf crate in
//! this dependency stack speaks the upstream vwad wire format or its
//! Ed25519/Z85 key encoding, so this module hand-rolls a compatible-in-spirit
//! container: a file table plus a deflate-packed payload blob, optionally
//! signed with the teacher's existing `p256` ECDSA stack and key material
//! rendered in the small Z85 codec below instead of base64. A SHA-256 digest
//! over the whole table-and-payload body guards against truncation or bit
//! rot independent of the optional signature, and each file record carries
//! its own CRC32 (same `crc32fast` pairing the teacher's WASP page header
//! uses) so a single damaged chunk is caught before it reaches the caller.

use crate::archive::base::{Archive, ArchiveBase, ArchiveFormatId};
use crate::errors::{ArchiveError, ArchiveResult};
use crate::memchunk::MemChunk;
use crc32fast::Hasher as Crc32Hasher;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"VWAD";
const MAX_PATH_LEN: usize = 256;

pub mod z85 {
    //! Minimal ZeroMQ Z85 codec: groups of 4 bytes <-> 5 printable ASCII
    //! characters. Input to `encode` must be a multiple of 4 bytes;
    //! `decode` input a multiple of 5 characters.
    const ALPHABET: &[u8; 85] =
        b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

    #[must_use]
    pub fn encode(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 5 / 4);
        for chunk in bytes.chunks(4) {
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            let mut value = u32::from_be_bytes(buf);
            let mut chars = [0u8; 5];
            for slot in chars.iter_mut().rev() {
                *slot = ALPHABET[(value % 85) as usize];
                value /= 85;
            }
            out.push_str(std::str::from_utf8(&chars).expect("ascii"));
        }
        out
    }

    #[must_use]
    pub fn decode(text: &str) -> Option<Vec<u8>> {
        if !text.len().is_multiple_of(5) {
            return None;
        }
        let mut reverse = [255u8; 256];
        for (i, &c) in ALPHABET.iter().enumerate() {
            reverse[c as usize] = i as u8;
        }
        let mut out = Vec::with_capacity(text.len() * 4 / 5);
        for chunk in text.as_bytes().chunks(5) {
            let mut value: u32 = 0;
            for &c in chunk {
                let digit = reverse[c as usize];
                if digit == 255 {
                    return None;
                }
                value = value.wrapping_mul(85).wrapping_add(u32::from(digit));
            }
            out.extend_from_slice(&value.to_be_bytes());
        }
        Some(out)
    }
}

#[derive(Debug, Clone)]
pub struct VWadKeyPair {
    pub signing_key: SigningKey,
}

impl VWadKeyPair {
    #[must_use]
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::random(&mut rand_core::OsRng) }
    }

    /// Parses a Z85-encoded 32-byte scalar. `BadKey` on malformed input,
    /// `WeakKey` on an all-zero scalar (the one scalar value the curve
    /// rejects outright and the clearest "not actually random" signal).
    pub fn from_z85(text: &str) -> ArchiveResult<Self> {
        let bytes = zeroize::Zeroizing::new(z85::decode(text).ok_or(ArchiveError::BadKey)?);
        if bytes.iter().all(|&b| b == 0) {
            return Err(ArchiveError::WeakKey);
        }
        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| ArchiveError::BadKey)?;
        Ok(Self { signing_key })
    }

    #[must_use]
    pub fn to_z85(&self) -> String {
        z85::encode(&self.signing_key.to_bytes())
    }

    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        VerifyingKey::from(&self.signing_key).to_encoded_point(true).as_bytes().to_vec()
    }
}

struct VWadFileRecord {
    path: String,
    is_dir: bool,
    unpacked_size: u64,
    packed: bool,
    data: Vec<u8>,
    crc32: u32,
}

pub struct VWadArchive {
    base: ArchiveBase,
    author: parking_lot::RwLock<String>,
    title: parking_lot::RwLock<String>,
    comment: parking_lot::RwLock<String>,
    signing_key: parking_lot::RwLock<Option<VWadKeyPair>>,
    /// Raw bytes of the archive as last opened/written, kept around so an
    /// incremental save can raw-copy an unmodified entry's packed chunk
    /// instead of re-deflating it (mirrors `ZipArchive::temp_file`, per
    /// §5's "Temp files (ZipArchive, VWadArchive) are owned by the archive
    /// and removed on drop" — this one lives in memory rather than on disk
    /// since vwad archives don't stream from a reusable zip-style reader).
    prior_bytes: parking_lot::Mutex<Option<Vec<u8>>>,
}

impl VWadArchive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: ArchiveBase::new(ArchiveFormatId::VWad),
            author: parking_lot::RwLock::new(String::new()),
            title: parking_lot::RwLock::new(String::new()),
            comment: parking_lot::RwLock::new(String::new()),
            signing_key: parking_lot::RwLock::new(None),
            prior_bytes: parking_lot::Mutex::new(None),
        }
    }

    pub fn set_metadata(&self, author: &str, title: &str, comment: &str) {
        *self.author.write() = author.to_string();
        *self.title.write() = title.to_string();
        *self.comment.write() = comment.to_string();
    }

    /// Overrides just the signing identity's author name, leaving any
    /// title/comment already read from the file untouched.
    pub fn set_author(&self, author: &str) {
        *self.author.write() = author.to_string();
    }

    pub fn set_signing_key(&self, key: Option<VWadKeyPair>) {
        *self.signing_key.write() = key;
    }

    fn normalize_path(path: &str) -> ArchiveResult<String> {
        let normalized = path.replace('\\', "/");
        if normalized.len() > MAX_PATH_LEN {
            return Err(ArchiveError::InvalidFormat(format!("vwad path exceeds {MAX_PATH_LEN} bytes")));
        }
        Ok(normalized)
    }
}

impl Default for VWadArchive {
    fn default() -> Self {
        Self::new()
    }
}

fn pack_chunk(bytes: &[u8]) -> (bool, Vec<u8>) {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(6));
    if enc.write_all(bytes).is_err() {
        return (false, bytes.to_vec());
    }
    match enc.finish() {
        Ok(packed) if packed.len() < bytes.len() => (true, packed),
        _ => (false, bytes.to_vec()),
    }
}

fn unpack_chunk(bytes: &[u8], packed: bool, unpacked_size: u64) -> ArchiveResult<Vec<u8>> {
    if !packed {
        return Ok(bytes.to_vec());
    }
    let mut dec = ZlibDecoder::new(bytes);
    let mut out = Vec::with_capacity(unpacked_size as usize);
    dec.read_to_end(&mut out).map_err(|_| ArchiveError::Corrupt("vwad chunk inflate failed".to_string()))?;
    Ok(out)
}

/// A file-table record plus its still-packed payload bytes, read straight
/// off the wire. Shared by `open_bytes` (to populate the tree) and
/// `write_bytes` (to raw-copy an unmodified entry's chunk from the prior
/// save instead of re-deflating it).
struct ParsedRecord {
    path: String,
    is_dir: bool,
    unpacked_size: u64,
    packed: bool,
    crc32: u32,
    raw: Vec<u8>,
}

struct ParsedVWad {
    author: String,
    title: String,
    comment: String,
    records: Vec<ParsedRecord>,
}

fn parse_vwad(bytes: &[u8]) -> ArchiveResult<ParsedVWad> {
    let mut mc = MemChunk::from_vec(bytes.to_vec());
    if mc.size() < 4 || &mc.read(4).map_err(ArchiveError::Io)?[..] != MAGIC {
        return Err(ArchiveError::InvalidFormat("not a vwad archive".to_string()));
    }
    let signed = mc.read(1).map_err(ArchiveError::Io)?[0] != 0;
    if signed {
        mc.read(33).map_err(ArchiveError::Io)?;
    }

    let content_len = mc.read_u32_le().map_err(ArchiveError::Io)? as usize;
    let digest = mc.read(32).map_err(ArchiveError::Io)?.to_vec();
    let content_start = mc.pos();
    let content_end = content_start + content_len;
    if content_end > mc.size() {
        return Err(ArchiveError::Corrupt("vwad content length out of bounds".to_string()));
    }
    if Sha256::digest(&mc.data()[content_start..content_end]).as_slice() != digest.as_slice() {
        return Err(ArchiveError::Corrupt("vwad content hash mismatch".to_string()));
    }

    let read_string = |mc: &mut MemChunk| -> ArchiveResult<String> {
        let len = mc.read_u16_le().map_err(ArchiveError::Io)? as usize;
        Ok(String::from_utf8_lossy(mc.read(len).map_err(ArchiveError::Io)?).into_owned())
    };
    let author = read_string(&mut mc)?;
    let title = read_string(&mut mc)?;
    let comment = read_string(&mut mc)?;

    let num_files = mc.read_u32_le().map_err(ArchiveError::Io)? as usize;
    struct RawHeader {
        path: String,
        is_dir: bool,
        offset: u64,
        unpacked_size: u64,
        packed_size: u64,
        packed: bool,
        crc32: u32,
    }
    let mut headers = Vec::with_capacity(num_files);
    for _ in 0..num_files {
        let path_len = mc.read_u16_le().map_err(ArchiveError::Io)? as usize;
        let path = String::from_utf8_lossy(mc.read(path_len).map_err(ArchiveError::Io)?).into_owned();
        let is_dir = mc.read(1).map_err(ArchiveError::Io)?[0] != 0;
        let offset = u64::from(mc.read_u32_le().map_err(ArchiveError::Io)?);
        let unpacked_size = u64::from(mc.read_u32_le().map_err(ArchiveError::Io)?);
        let packed_size = u64::from(mc.read_u32_le().map_err(ArchiveError::Io)?);
        let packed = mc.read(1).map_err(ArchiveError::Io)?[0] != 0;
        let crc32 = mc.read_u32_le().map_err(ArchiveError::Io)?;
        headers.push(RawHeader { path, is_dir, offset, unpacked_size, packed_size, packed, crc32 });
    }

    let payload_start = mc.pos();
    let mut records = Vec::with_capacity(headers.len());
    for h in &headers {
        if h.is_dir {
            records.push(ParsedRecord {
                path: h.path.clone(),
                is_dir: true,
                unpacked_size: h.unpacked_size,
                packed: h.packed,
                crc32: h.crc32,
                raw: Vec::new(),
            });
            continue;
        }
        let start = payload_start + h.offset as usize;
        let end = start + h.packed_size as usize;
        if end > mc.size() {
            return Err(ArchiveError::Corrupt(format!("vwad entry {} payload out of bounds", h.path)));
        }
        let raw = mc.data()[start..end].to_vec();
        let mut hasher = Crc32Hasher::new();
        hasher.update(&raw);
        if hasher.finalize() != h.crc32 {
            return Err(ArchiveError::Corrupt(format!("vwad entry {} failed crc32 check", h.path)));
        }
        records.push(ParsedRecord { path: h.path.clone(), is_dir: false, unpacked_size: h.unpacked_size, packed: h.packed, crc32: h.crc32, raw });
    }

    Ok(ParsedVWad { author, title, comment, records })
}

impl Archive for VWadArchive {
    fn base(&self) -> &ArchiveBase {
        &self.base
    }

    fn open_bytes(&self, bytes: &[u8]) -> ArchiveResult<()> {
        let parsed = parse_vwad(bytes)?;
        *self.author.write() = parsed.author;
        *self.title.write() = parsed.title;
        *self.comment.write() = parsed.comment;

        let root = self.base.root().clone();
        for (fidx, rec) in parsed.records.iter().enumerate() {
            let path = Self::normalize_path(&rec.path)?;
            if rec.is_dir || path.ends_with('/') {
                root.create_dir_path(path.trim_end_matches('/'));
                continue;
            }
            let data = unpack_chunk(&rec.raw, rec.packed, rec.unpacked_size)?;
            let (dir_path, name) = path.rsplit_once('/').map_or((String::new(), path.clone()), |(d, n)| (d.to_string(), n.to_string()));
            let dir = if dir_path.is_empty() { root.clone() } else { root.create_dir_path(&dir_path) };
            let entry = crate::archive::entry::ArchiveEntry::new(name, data);
            entry.set_ex_prop("VWadIndex", fidx as f64);
            entry.force_unmodified();
            dir.add_entry(entry, None)?;
        }
        *self.prior_bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }

    fn write_bytes(&self) -> ArchiveResult<Vec<u8>> {
        let entries = self.base.entry_tree_as_list();
        let prior_records = self.prior_bytes.lock().as_deref().and_then(|b| parse_vwad(b).ok()).map(|p| p.records);
        let mut records = Vec::with_capacity(entries.len());

        for entry in &entries {
            let mut reused: Option<&ParsedRecord> = None;
            if entry.state() == crate::archive::entry::EntryState::Unmodified {
                if let (Some(recs), Some(prop)) = (prior_records.as_ref(), entry.ex_prop("VWadIndex")) {
                    let idx = prop.as_uint() as usize;
                    if let Some(rec) = recs.get(idx) {
                        if !rec.is_dir && rec.path == entry.name() {
                            reused = Some(rec);
                        }
                    }
                }
            }

            if let Some(rec) = reused {
                records.push(VWadFileRecord {
                    path: entry.name(),
                    is_dir: false,
                    unpacked_size: rec.unpacked_size,
                    packed: rec.packed,
                    data: rec.raw.clone(),
                    crc32: rec.crc32,
                });
            } else {
                let bytes = entry.data_if_loaded().unwrap_or_default();
                let (packed, packed_bytes) = pack_chunk(&bytes);
                let mut hasher = Crc32Hasher::new();
                hasher.update(&packed_bytes);
                records.push(VWadFileRecord {
                    path: entry.name(),
                    is_dir: false,
                    unpacked_size: bytes.len() as u64,
                    packed,
                    data: packed_bytes,
                    crc32: hasher.finalize(),
                });
            }
            entry.set_ex_prop("VWadIndex", (records.len() - 1) as f64);
        }

        let signing_key = self.signing_key.read().clone();
        let mut header = MemChunk::new();
        header.append(MAGIC);
        header.append(&[u8::from(signing_key.is_some())]);
        if let Some(key) = &signing_key {
            header.append(&key.public_key_bytes());
        }

        let mut body = MemChunk::new();
        for s in [&*self.author.read(), &*self.title.read(), &*self.comment.read()] {
            let bytes = s.as_bytes();
            body.write_i16_le(bytes.len() as i16);
            body.append(bytes);
        }
        body.write_u32_le(records.len() as u32);
        let mut offset_cursor = 0u64;
        let mut table_and_payload = MemChunk::new();
        for rec in &records {
            table_and_payload.write_i16_le(rec.path.len() as i16);
            table_and_payload.append(rec.path.as_bytes());
            table_and_payload.append(&[u8::from(rec.is_dir)]);
            table_and_payload.write_u32_le(offset_cursor as u32);
            table_and_payload.write_u32_le(rec.unpacked_size as u32);
            table_and_payload.write_u32_le(rec.data.len() as u32);
            table_and_payload.append(&[u8::from(rec.packed)]);
            table_and_payload.write_u32_le(rec.crc32);
            offset_cursor += rec.data.len() as u64;
        }
        for rec in &records {
            table_and_payload.append(&rec.data);
        }

        let mut content = Vec::new();
        content.extend_from_slice(body.data());
        content.extend_from_slice(table_and_payload.data());
        let digest = Sha256::digest(&content);

        let mut out = Vec::new();
        out.extend_from_slice(header.data());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&digest);
        out.extend_from_slice(&content);

        if let Some(key) = &signing_key {
            let signature: Signature = key.signing_key.sign(&out);
            out.extend_from_slice(signature.to_bytes().as_slice());
        }

        for entry in &entries {
            entry.force_unmodified();
        }
        *self.prior_bytes.lock() = Some(out.clone());
        Ok(out)
    }
}

/// Generates a fresh signing identity, Z85-encoded, without attaching it to
/// any archive — lets a user mint a key before deciding what to sign.
#[must_use]
pub fn generate_private_key() -> String {
    VWadKeyPair::generate().to_z85()
}

/// Derives the Z85-encoded public key from a Z85-encoded private key.
pub fn derive_public_key(private_key: &str) -> ArchiveResult<String> {
    Ok(z85::encode(&VWadKeyPair::from_z85(private_key)?.public_key_bytes()))
}

/// Verifies `signature` (the trailing bytes of a signed archive's byte
/// stream) against `body` using `pubkey` (SEC1-compressed point bytes).
pub fn verify_signature(body: &[u8], signature: &[u8], pubkey: &[u8]) -> ArchiveResult<bool> {
    let verifying_key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| ArchiveError::BadKey)?;
    let sig = Signature::from_slice(signature).map_err(|_| ArchiveError::Corrupt("malformed signature".to_string()))?;
    Ok(verifying_key.verify(body, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z85_round_trips_arbitrary_bytes() {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let encoded = z85::encode(&bytes);
        assert_eq!(z85::decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn from_z85_rejects_all_zero_key_as_weak() {
        let zero = z85::encode(&[0u8; 32]);
        let err = VWadKeyPair::from_z85(&zero).unwrap_err();
        assert!(matches!(err, ArchiveError::WeakKey));
    }

    #[test]
    fn open_then_write_round_trips_entry_bytes() {
        let archive = VWadArchive::new();
        archive.base().add_entry(None, crate::archive::entry::ArchiveEntry::new("a.txt", b"hello world".to_vec()), None).unwrap();
        let bytes = archive.write_bytes().unwrap();

        let reopened = VWadArchive::new();
        reopened.open_bytes(&bytes).unwrap();
        let entry = reopened.base().find_first(&crate::archive::search::SearchOptions {
            match_name: Some("a.txt".to_string()),
            ..Default::default()
        }).unwrap();
        assert_eq!(entry.data_if_loaded().unwrap(), b"hello world");
    }

    #[test]
    fn corrupted_payload_byte_fails_crc32_check() {
        let archive = VWadArchive::new();
        archive.base().add_entry(None, crate::archive::entry::ArchiveEntry::new("a.txt", b"hello world".to_vec()), None).unwrap();
        let mut bytes = archive.write_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let reopened = VWadArchive::new();
        let err = reopened.open_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn generate_private_key_derives_matching_public_key() {
        let priv_key = generate_private_key();
        let pubkey = derive_public_key(&priv_key).unwrap();
        let pair = VWadKeyPair::from_z85(&priv_key).unwrap();
        assert_eq!(pubkey, z85::encode(&pair.public_key_bytes()));
    }

    #[test]
    fn incremental_save_raw_copies_unmodified_entry_chunk() {
        let archive = VWadArchive::new();
        archive.base().add_entry(None, crate::archive::entry::ArchiveEntry::new("a.txt", b"hello world".to_vec()), None).unwrap();
        archive.base().add_entry(None, crate::archive::entry::ArchiveEntry::new("b.txt", b"original b".to_vec()), None).unwrap();
        let first = archive.write_bytes().unwrap();
        let first_parsed = parse_vwad(&first).unwrap();
        let a_first = first_parsed.records.iter().find(|r| r.path == "a.txt").unwrap();

        let reopened = VWadArchive::new();
        reopened.open_bytes(&first).unwrap();
        let b = reopened
            .base()
            .find_first(&crate::archive::search::SearchOptions { match_name: Some("b.txt".to_string()), ..Default::default() })
            .unwrap();
        b.import_bytes(b"changed b".to_vec());
        b.set_state(crate::archive::entry::EntryState::Modified);

        let second = reopened.write_bytes().unwrap();
        let second_parsed = parse_vwad(&second).unwrap();
        let a_second = second_parsed.records.iter().find(|r| r.path == "a.txt").unwrap();

        // `a.txt` was never touched, so its packed chunk must be raw-copied
        // byte-for-byte rather than re-deflated.
        assert_eq!(a_second.raw, a_first.raw);
        assert_eq!(a_second.crc32, a_first.crc32);

        let reopened2 = VWadArchive::new();
        reopened2.open_bytes(&second).unwrap();
        let b2 = reopened2
            .base()
            .find_first(&crate::archive::search::SearchOptions { match_name: Some("b.txt".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(b2.data_if_loaded().unwrap(), b"changed b");
    }

    #[test]
    fn signed_archive_signature_verifies_against_its_own_key() {
        let key = VWadKeyPair::generate();
        let pubkey = key.public_key_bytes();
        let archive = VWadArchive::new();
        archive.set_signing_key(Some(key));
        archive.base().add_entry(None, crate::archive::entry::ArchiveEntry::new("x", b"data".to_vec()), None).unwrap();
        let bytes = archive.write_bytes().unwrap();
        let (body, sig) = bytes.split_at(bytes.len() - 64);
        assert!(verify_signature(body, sig, &pubkey).unwrap());
    }
}
