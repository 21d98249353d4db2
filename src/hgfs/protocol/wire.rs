//! Little-endian field codecs shared by requests and replies.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::types::{AttrFlags, AttrMask, FileAttr, FileType};
use crate::hgfs::utils::cpname::CpName;

/// V1 attribute record: type, size, four times, owner permissions.
pub const ATTR_V1_SIZE: usize = 4 + 8 * 5 + 1;
/// V2 attribute record.
pub const ATTR_V2_SIZE: usize = 8 + 4 + 8 * 5 + 4 + 8 + 8 + 4 + 4 + 8 + 4 + 1 + 8;
/// Length prefix of a V1/V2 name.
pub const NAME_SIZE: usize = 4;
/// Fixed part of a `FileNameV3`: length, flags, case type, handle.
pub const NAME_V3_SIZE: usize = 16;

/// `FileNameV3` flag: the name is given by an open handle.
pub const NAME_V3_USE_FILE_DESC: u32 = 1 << 0;

/// Bounds-checked reader over a request payload.
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, what: &str) -> HgfsResult<()> {
        if self.buf.remaining() < n {
            return Err(HgfsError::Protocol(format!(
                "truncated {what}: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> HgfsResult<u8> {
        self.need(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn u32(&mut self) -> HgfsResult<u32> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32_le())
    }

    pub fn u64(&mut self) -> HgfsResult<u64> {
        self.need(8, "u64")?;
        Ok(self.buf.get_u64_le())
    }

    pub fn skip(&mut self, n: usize) -> HgfsResult<()> {
        self.need(n, "reserved field")?;
        self.buf.advance(n);
        Ok(())
    }

    pub fn bytes(&mut self, n: usize) -> HgfsResult<Bytes> {
        self.need(n, "data")?;
        Ok(self.buf.split_to(n))
    }

    /// `len u32` followed by `len` bytes.
    pub fn name(&mut self) -> HgfsResult<Bytes> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    pub fn cp_name(&mut self) -> HgfsResult<CpName> {
        CpName::parse(&self.name()?)
    }

    /// `FileNameV3`; returns the handle when the name is given by one.
    pub fn name_v3(&mut self) -> HgfsResult<(Option<u32>, Bytes)> {
        let len = self.u32()? as usize;
        let flags = self.u32()?;
        let _case_type = self.u32()?;
        let fid = self.u32()?;
        let name = self.bytes(len)?;
        let handle = (flags & NAME_V3_USE_FILE_DESC != 0).then_some(fid);
        Ok((handle, name))
    }

    pub fn attr_v1(&mut self) -> HgfsResult<FileAttr> {
        let file_type = FileType::try_from(self.u32()?)?;
        let size = self.u64()?;
        let creation_time = self.u64()?;
        let access_time = self.u64()?;
        let write_time = self.u64()?;
        let change_time = self.u64()?;
        let owner_perms = self.u8()?;
        Ok(FileAttr {
            mask: AttrMask::TYPE
                | AttrMask::SIZE
                | AttrMask::CREATE_TIME
                | AttrMask::ACCESS_TIME
                | AttrMask::WRITE_TIME
                | AttrMask::CHANGE_TIME
                | AttrMask::OWNER_PERMS,
            file_type,
            size,
            creation_time,
            access_time,
            write_time,
            change_time,
            owner_perms,
            ..Default::default()
        })
    }

    pub fn attr_v2(&mut self) -> HgfsResult<FileAttr> {
        let mask = AttrMask::from_bits_truncate(self.u64()?);
        let file_type = FileType::try_from(self.u32()?)?;
        let attr = FileAttr {
            mask,
            file_type,
            size: self.u64()?,
            creation_time: self.u64()?,
            access_time: self.u64()?,
            write_time: self.u64()?,
            change_time: self.u64()?,
            special_perms: self.u8()?,
            owner_perms: self.u8()?,
            group_perms: self.u8()?,
            other_perms: self.u8()?,
            flags: AttrFlags::from_bits_truncate(self.u64()?),
            allocation_size: self.u64()?,
            user_id: self.u32()?,
            group_id: self.u32()?,
            file_id: self.u64()?,
            volume_id: self.u32()?,
            effective_perms: self.u8()?,
        };
        self.skip(8)?;
        Ok(attr)
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

pub fn put_name(out: &mut BytesMut, name: &[u8]) {
    out.put_u32_le(name.len() as u32);
    out.put_slice(name);
}

pub fn put_attr_v1(out: &mut BytesMut, attr: &FileAttr) {
    out.put_u32_le(attr.file_type as u32);
    out.put_u64_le(attr.size);
    out.put_u64_le(attr.creation_time);
    out.put_u64_le(attr.access_time);
    out.put_u64_le(attr.write_time);
    out.put_u64_le(attr.change_time);
    out.put_u8(attr.owner_perms);
}

pub fn put_attr_v2(out: &mut BytesMut, attr: &FileAttr) {
    out.put_u64_le(attr.mask.bits());
    out.put_u32_le(attr.file_type as u32);
    out.put_u64_le(attr.size);
    out.put_u64_le(attr.creation_time);
    out.put_u64_le(attr.access_time);
    out.put_u64_le(attr.write_time);
    out.put_u64_le(attr.change_time);
    out.put_u8(attr.special_perms);
    out.put_u8(attr.owner_perms);
    out.put_u8(attr.group_perms);
    out.put_u8(attr.other_perms);
    out.put_u64_le(attr.flags.bits());
    out.put_u64_le(attr.allocation_size);
    out.put_u32_le(attr.user_id);
    out.put_u32_le(attr.group_id);
    out.put_u64_le(attr.file_id);
    out.put_u32_le(attr.volume_id);
    out.put_u8(attr.effective_perms);
    out.put_u64_le(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_v2_layout_matches_declared_size() {
        let attr = FileAttr {
            mask: AttrMask::SIZE | AttrMask::OWNER_PERMS,
            size: 42,
            owner_perms: 6,
            ..Default::default()
        };
        let mut out = BytesMut::new();
        put_attr_v2(&mut out, &attr);
        assert_eq!(out.len(), ATTR_V2_SIZE);

        let decoded = Reader::new(out.freeze()).attr_v2().unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn name_v3_by_handle() {
        let mut out = BytesMut::new();
        out.put_u32_le(0);
        out.put_u32_le(NAME_V3_USE_FILE_DESC);
        out.put_u32_le(0);
        out.put_u32_le(77);
        let (handle, name) = Reader::new(out.freeze()).name_v3().unwrap();
        assert_eq!(handle, Some(77));
        assert!(name.is_empty());
    }

    #[test]
    fn truncated_field_is_protocol_error() {
        let mut reader = Reader::new(Bytes::from_static(&[1, 2, 3]));
        assert!(matches!(reader.u32(), Err(HgfsError::Protocol(_))));
    }
}
