use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::hgfs::types::{AttrFlags, AttrMask, FileAttr, FileType};

/// 100ns ticks between 1601-01-01 and 1970-01-01.
const NT_UNIX_EPOCH_DELTA: u64 = 116_444_736_000_000_000;
const NT_TICKS_PER_SEC: u64 = 10_000_000;

pub struct MetadataConverter;

impl MetadataConverter {
    pub fn to_nt_time(time: SystemTime) -> u64 {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => since
                .as_secs()
                .saturating_mul(NT_TICKS_PER_SEC)
                .saturating_add(u64::from(since.subsec_nanos()) / 100)
                .saturating_add(NT_UNIX_EPOCH_DELTA),
            Err(before) => {
                let ticks = before.duration().as_nanos() / 100;
                NT_UNIX_EPOCH_DELTA.saturating_sub(u64::try_from(ticks).unwrap_or(u64::MAX))
            }
        }
    }

    pub fn from_nt_time(nt: u64) -> SystemTime {
        if nt >= NT_UNIX_EPOCH_DELTA {
            let ticks = nt - NT_UNIX_EPOCH_DELTA;
            UNIX_EPOCH
                + Duration::new(
                    ticks / NT_TICKS_PER_SEC,
                    ((ticks % NT_TICKS_PER_SEC) * 100) as u32,
                )
        } else {
            let ticks = NT_UNIX_EPOCH_DELTA - nt;
            UNIX_EPOCH
                - Duration::new(
                    ticks / NT_TICKS_PER_SEC,
                    ((ticks % NT_TICKS_PER_SEC) * 100) as u32,
                )
        }
    }

    pub fn to_file_attr(metadata: &std::fs::Metadata) -> FileAttr {
        let mut attr = FileAttr {
            mask: AttrMask::TYPE | AttrMask::SIZE,
            size: metadata.len(),
            ..Default::default()
        };

        attr.file_type = if metadata.file_type().is_symlink() {
            FileType::Symlink
        } else if metadata.is_dir() {
            FileType::Directory
        } else {
            FileType::Regular
        };

        if let Ok(modified) = metadata.modified() {
            attr.write_time = Self::to_nt_time(modified);
            attr.mask |= AttrMask::WRITE_TIME;
        }

        if let Ok(accessed) = metadata.accessed() {
            attr.access_time = Self::to_nt_time(accessed);
            attr.mask |= AttrMask::ACCESS_TIME;
        }

        if let Ok(created) = metadata.created() {
            attr.creation_time = Self::to_nt_time(created);
            attr.mask |= AttrMask::CREATE_TIME;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            let mode = metadata.mode();
            attr.special_perms = ((mode >> 9) & 0o7) as u8;
            attr.owner_perms = ((mode >> 6) & 0o7) as u8;
            attr.group_perms = ((mode >> 3) & 0o7) as u8;
            attr.other_perms = (mode & 0o7) as u8;
            attr.effective_perms = attr.owner_perms;
            attr.user_id = metadata.uid();
            attr.group_id = metadata.gid();
            attr.file_id = metadata.ino();
            attr.volume_id = metadata.dev() as u32;
            attr.allocation_size = metadata.blocks().saturating_mul(512);

            let ctime = UNIX_EPOCH
                + Duration::new(metadata.ctime().max(0) as u64, metadata.ctime_nsec() as u32);
            attr.change_time = Self::to_nt_time(ctime);

            if !attr.mask.contains(AttrMask::CREATE_TIME) {
                // No birth time on this filesystem; report change time.
                attr.creation_time = attr.change_time;
            }

            attr.mask |= AttrMask::CREATE_TIME
                | AttrMask::CHANGE_TIME
                | AttrMask::SPECIAL_PERMS
                | AttrMask::OWNER_PERMS
                | AttrMask::GROUP_PERMS
                | AttrMask::OTHER_PERMS
                | AttrMask::EFFECTIVE_PERMS
                | AttrMask::ALLOCATION_SIZE
                | AttrMask::USER_ID
                | AttrMask::GROUP_ID
                | AttrMask::FILE_ID
                | AttrMask::VOLUME_ID;
        }

        #[cfg(windows)]
        {
            let perms = if metadata.permissions().readonly() { 0o5 } else { 0o7 };
            attr.owner_perms = perms;
            attr.group_perms = perms;
            attr.other_perms = perms;
            attr.effective_perms = perms;
            attr.allocation_size = metadata.len();
            attr.mask |= AttrMask::OWNER_PERMS
                | AttrMask::GROUP_PERMS
                | AttrMask::OTHER_PERMS
                | AttrMask::EFFECTIVE_PERMS
                | AttrMask::ALLOCATION_SIZE;
        }

        if metadata.permissions().readonly() {
            attr.flags |= AttrFlags::READ_ONLY;
        }
        attr.mask |= AttrMask::FLAGS;

        attr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nt_time_round_trips_through_system_time() {
        let t = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_700);
        let nt = MetadataConverter::to_nt_time(t);
        assert_eq!(MetadataConverter::from_nt_time(nt), t);
    }

    #[test]
    fn unix_epoch_is_the_known_nt_offset() {
        assert_eq!(MetadataConverter::to_nt_time(UNIX_EPOCH), NT_UNIX_EPOCH_DELTA);
    }
}
