//! Takeover and restore of the system resolver configuration.

use std::fmt::Write as _;
use std::io::{ErrorKind, Write as _};
use std::net::IpAddr;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::ResolvConfError;
use crate::util::lookup_uid;

/// Resolver configuration the daemon points at the local cache.
pub trait ResolvConfWriter: Send + Sync {
    /// Backs up the current configuration and replaces it with one that
    /// uses only `listen_address`.
    fn apply(&mut self, listen_address: IpAddr, options: &str) -> Result<(), ResolvConfError>;

    /// Puts the backed up configuration back. Does nothing if [`apply`]
    /// never succeeded.
    ///
    /// [`apply`]: Self::apply
    fn revert(&mut self) -> Result<(), ResolvConfError>;

    /// Rewrites the `search` line of the applied configuration.
    fn update_search_domains(&mut self, domains: &[String]) -> Result<(), ResolvConfError>;
}

/// What was at the resolv.conf path before the takeover.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Backup {
    Contents(String),
    Link(PathBuf),
}

/// Mode and owner every write to the file keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attributes {
    mode: u32,
    owner: Option<(u32, u32)>,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            mode: 0o644,
            owner: None,
        }
    }
}

impl From<&std::fs::Metadata> for Attributes {
    fn from(metadata: &std::fs::Metadata) -> Self {
        Self {
            mode: metadata.permissions().mode() & 0o7777,
            owner: Some((metadata.uid(), metadata.gid())),
        }
    }
}

/// Manages a resolv.conf file on disk.
///
/// The previous contents are kept in memory. Symlinks (as left by other
/// resolver managers) are restored as symlinks. A regular file keeps its
/// mode and owner across the takeover.
#[derive(Debug)]
pub struct ResolvConfManager {
    path: PathBuf,
    backup: Option<Backup>,
    attributes: Attributes,
    listen_address: Option<IpAddr>,
    options: String,
}

impl ResolvConfManager {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup: None,
            attributes: Attributes::default(),
            listen_address: None,
            options: String::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a takeover is in effect.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.backup.is_some()
    }

    /// Replaces the file with an empty one owned by `user` (a name or a
    /// numeric uid), so a daemon running as that user can take it over.
    /// A symlink at the path is removed first; the group is left alone.
    ///
    /// # Errors
    ///
    /// [`ResolvConfError::UnknownUser`] if `user` does not exist, otherwise
    /// the I/O error of removing, creating or chowning the file.
    pub fn chown(&self, user: &str) -> Result<(), ResolvConfError> {
        let uid = lookup_uid(user)?.ok_or_else(|| ResolvConfError::UnknownUser {
            user: user.to_string(),
        })?;

        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata) if metadata.file_type().is_symlink() => std::fs::remove_file(&self.path)?,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::File::create(&self.path)?;
        std::os::unix::fs::chown(&self.path, Some(uid), None)?;

        tracing::info!(path = %self.path.display(), user, uid, "Handed resolv.conf over");
        Ok(())
    }

    fn take_backup(&self) -> Result<(Backup, Attributes), ResolvConfError> {
        let metadata = match std::fs::symlink_metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ResolvConfError::Missing {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&self.path)?;
            Ok((Backup::Link(target), Attributes::default()))
        } else {
            let contents = std::fs::read_to_string(&self.path)?;
            Ok((Backup::Contents(contents), Attributes::from(&metadata)))
        }
    }

    /// Replaces the file atomically through a temporary file in the same
    /// directory. A symlink at the path is replaced, not followed.
    ///
    /// When the file cannot be renamed over (a bind mount, or a directory
    /// only root may write to) it is rewritten in place instead.
    fn write(&self, contents: &str) -> Result<(), ResolvConfError> {
        match self.replace(contents) {
            Ok(()) => Ok(()),
            Err(e) if must_write_in_place(&e) => {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Cannot replace resolv.conf, rewriting it in place"
                );
                self.write_in_place(contents)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replace(&self, contents: &str) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(self.attributes.mode))?;
        if let Some((uid, gid)) = self.attributes.owner {
            let created = file.as_file().metadata()?;
            if (created.uid(), created.gid()) != (uid, gid) {
                std::os::unix::fs::fchown(file.as_file(), Some(uid), Some(gid))?;
            }
        }
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_in_place(&self, contents: &str) -> Result<(), ResolvConfError> {
        if std::fs::symlink_metadata(&self.path).is_ok_and(|m| m.file_type().is_symlink()) {
            std::fs::remove_file(&self.path)?;
        }
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Errors after which renaming over the file cannot work but truncating it
/// still may.
fn must_write_in_place(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ResourceBusy | ErrorKind::CrossesDevices | ErrorKind::PermissionDenied
    )
}

impl ResolvConfWriter for ResolvConfManager {
    fn apply(&mut self, listen_address: IpAddr, options: &str) -> Result<(), ResolvConfError> {
        if self.backup.is_none() {
            let (backup, attributes) = self.take_backup()?;
            self.backup = Some(backup);
            self.attributes = attributes;
        }
        self.write(&render(listen_address, options, &[]))?;
        self.listen_address = Some(listen_address);
        self.options = options.to_string();
        tracing::info!(path = %self.path.display(), %listen_address, "Resolv.conf now points at the local cache");
        Ok(())
    }

    fn revert(&mut self) -> Result<(), ResolvConfError> {
        let Some(backup) = &self.backup else {
            tracing::debug!("Resolv.conf was never applied, nothing to revert");
            return Ok(());
        };

        match backup {
            Backup::Contents(contents) => self.write(contents)?,
            Backup::Link(target) => {
                match std::fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                std::os::unix::fs::symlink(target, &self.path)?;
            }
        }

        self.backup = None;
        self.attributes = Attributes::default();
        self.listen_address = None;
        tracing::info!(path = %self.path.display(), "Resolv.conf restored");
        Ok(())
    }

    fn update_search_domains(&mut self, domains: &[String]) -> Result<(), ResolvConfError> {
        let listen_address = self.listen_address.ok_or(ResolvConfError::NotApplied)?;
        self.write(&render(listen_address, &self.options, domains))?;
        tracing::debug!(?domains, "Search domains updated");
        Ok(())
    }
}

/// Renders a resolv.conf using only the local cache.
#[must_use]
pub fn render(listen_address: IpAddr, options: &str, search: &[String]) -> String {
    let mut out = String::from("# Generated by dnsconfd\n");
    let options = options.trim();
    if !options.is_empty() {
        let _ = writeln!(out, "options {options}");
    }
    let _ = writeln!(out, "nameserver {listen_address}");
    if !search.is_empty() {
        let _ = writeln!(out, "search {}", search.join(" "));
    }
    out
}
