//! Path-addressed I/O adapter for the `Dir` and `Disk` medium families.
//!
//! Extended attributes have no portable `std`-only syscall, so they are
//! stored in a sidecar `<address>.attrs.json` file next to the payload
//! rather than as real POSIX xattrs; `set_md` writes it, `get`/`open`(read)
//! read it back. This keeps the adapter independent of any particular
//! platform's xattr size limits, which matters for the (sizeable) `user_md`
//! blob.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, PhobosError, Result};
use crate::io_adapter::{ExtentKey, IoAdapter, IoDescriptor, IoFlags};

fn io_err(context: &str, err: std::io::Error) -> PhobosError {
    let errno = err.raw_os_error().unwrap_or(-1);
    PhobosError::with_errno(ErrorKind::Io(format!("{context}: {err}")), errno)
}

/// Per-open context for [`PosixAdapter`].
struct PosixContext {
    file: File,
    attrs_path: PathBuf,
}

/// I/O adapter backing the `Dir` and `Disk` medium families with plain
/// filesystem files.
#[derive(Debug, Default)]
pub struct PosixAdapter;

impl PosixAdapter {
    fn resolve(&self, iod: &IoDescriptor, key: &ExtentKey) -> PathBuf {
        Path::new(&iod.root_path).join(&key.address)
    }

    fn attrs_path(payload_path: &Path) -> PathBuf {
        let mut p = payload_path.as_os_str().to_owned();
        p.push(".attrs.json");
        PathBuf::from(p)
    }
}

impl IoAdapter for PosixAdapter {
    fn open(&self, key: &ExtentKey, iod: &mut IoDescriptor, is_put: bool) -> Result<()> {
        let path = self.resolve(iod, key);
        if is_put {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err("create_dir_all", e))?;
            }
            let mut opts = OpenOptions::new();
            opts.write(true).create(true);
            if iod.flags.contains(IoFlags::REPLACE) {
                opts.truncate(true);
            } else {
                opts.create_new(true);
            }
            let file = opts.open(&path).map_err(|e| io_err("open for write", e))?;
            iod.context = Some(Box::new(PosixContext {
                file,
                attrs_path: Self::attrs_path(&path),
            }));
        } else {
            self.get(key, iod)?;
        }
        Ok(())
    }

    fn write(&self, iod: &mut IoDescriptor, buf: &[u8], count: usize) -> Result<usize> {
        let ctx = iod.context_mut::<PosixContext>();
        ctx.file
            .write_all(&buf[..count])
            .map_err(|e| io_err("write", e))?;
        Ok(count)
    }

    fn read(&self, iod: &mut IoDescriptor, buf: &mut [u8], count: usize) -> Result<usize> {
        let ctx = iod.context_mut::<PosixContext>();
        let mut total = 0;
        while total < count {
            let n = ctx
                .file
                .read(&mut buf[total..count])
                .map_err(|e| io_err("read", e))?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn close(&self, iod: &mut IoDescriptor) -> Result<()> {
        let sync = iod.flags.contains(IoFlags::SYNC_FILE);
        let ctx = iod.take_context::<PosixContext>();
        if sync {
            ctx.file.sync_all().map_err(|e| io_err("sync_all", e))?;
        }
        drop(ctx.file);
        Ok(())
    }

    fn get(&self, key: &ExtentKey, iod: &mut IoDescriptor) -> Result<()> {
        let path = self.resolve(iod, key);
        let file = File::open(&path).map_err(|e| io_err("open for read", e))?;
        if let Ok(raw) = fs::read_to_string(Self::attrs_path(&path)) {
            if let Ok(attrs) = serde_json::from_str(&raw) {
                iod.attrs = attrs;
            }
        }
        iod.context = Some(Box::new(PosixContext {
            file,
            attrs_path: Self::attrs_path(&path),
        }));
        Ok(())
    }

    fn del(&self, iod: &mut IoDescriptor) -> Result<()> {
        let ctx = iod.take_context::<PosixContext>();
        let _ = fs::remove_file(&ctx.attrs_path);
        drop(ctx.file);
        Ok(())
    }

    fn set_md(&self, iod: &mut IoDescriptor, _key: &ExtentKey) -> Result<()> {
        let attrs_path = {
            let ctx = iod.context_mut::<PosixContext>();
            ctx.attrs_path.clone()
        };
        let encoded = serde_json::to_string(&iod.attrs).unwrap_or_default();
        fs::write(&attrs_path, encoded).map_err(|e| io_err("write attrs", e))
    }

    fn preferred_io_size(&self) -> Option<u64> {
        Some(64 * 1024)
    }

    fn medium_sync(&self, root: &str) -> Result<()> {
        // Best-effort directory fsync so a partial release is durable
        // before the medium is handed back to the LRS pool.
        if let Ok(dir) = File::open(root) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lrs::ExtentAttrs;
    use crate::model::medium::{Family, MediumRef};
    use tempfile::tempdir;

    fn descriptor(root: &Path) -> IoDescriptor {
        IoDescriptor {
            flags: IoFlags::empty(),
            size: 0,
            medium: MediumRef::new(Family::Dir, "lib0", "dir1"),
            root_path: root.to_string_lossy().into_owned(),
            attrs: ExtentAttrs {
                user_md: "{}".into(),
                object_size: 0,
                object_version: 1,
                layout_name: "plain".into(),
                copy_name: "r0".into(),
                object_uuid: 1,
                id: "obj".into(),
            },
            context: None,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let adapter = PosixAdapter::default();
        let key = ExtentKey {
            address: "aa/bb/extent0".into(),
        };

        let mut write_iod = descriptor(dir.path());
        adapter.open(&key, &mut write_iod, true).unwrap();
        adapter.write(&mut write_iod, b"hello world", 11).unwrap();
        adapter.set_md(&mut write_iod, &key).unwrap();
        adapter.close(&mut write_iod).unwrap();

        let mut read_iod = descriptor(dir.path());
        adapter.get(&key, &mut read_iod).unwrap();
        let mut buf = [0u8; 11];
        let n = adapter.read(&mut read_iod, &mut buf, 11).unwrap();
        adapter.close(&mut read_iod).unwrap();

        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
        assert_eq!(read_iod.attrs.copy_name, "r0");
    }

    #[test]
    fn replace_flag_allows_overwrite() {
        let dir = tempdir().unwrap();
        let adapter = PosixAdapter::default();
        let key = ExtentKey {
            address: "cc/dd/extent1".into(),
        };

        let mut first = descriptor(dir.path());
        adapter.open(&key, &mut first, true).unwrap();
        adapter.write(&mut first, b"first", 5).unwrap();
        adapter.close(&mut first).unwrap();

        let mut second = descriptor(dir.path());
        second.flags = IoFlags::REPLACE;
        adapter.open(&key, &mut second, true).unwrap();
        adapter.write(&mut second, b"replaced!!", 10).unwrap();
        adapter.close(&mut second).unwrap();

        let mut read_iod = descriptor(dir.path());
        adapter.get(&key, &mut read_iod).unwrap();
        let mut buf = [0u8; 10];
        let n = adapter.read(&mut read_iod, &mut buf, 10).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf, b"replaced!!");
    }

    #[test]
    fn del_removes_payload_and_attrs() {
        let dir = tempdir().unwrap();
        let adapter = PosixAdapter::default();
        let key = ExtentKey {
            address: "ee/ff/extent2".into(),
        };

        let mut write_iod = descriptor(dir.path());
        adapter.open(&key, &mut write_iod, true).unwrap();
        adapter.write(&mut write_iod, b"bye", 3).unwrap();
        adapter.set_md(&mut write_iod, &key).unwrap();
        adapter.close(&mut write_iod).unwrap();

        let mut del_iod = descriptor(dir.path());
        adapter.get(&key, &mut del_iod).unwrap();
        adapter.del(&mut del_iod).unwrap();

        let path = dir.path().join("ee/ff/extent2");
        assert!(!path.exists());
        assert!(!PosixAdapter::attrs_path(&path).exists());
    }
}
