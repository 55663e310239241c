use std::path::Path;
use std::sync::{Mutex, RwLock};

use strata_types::{Address, RevisionNumber, TypedAddress, HEAD_REVISION};
use tracing::{debug, warn};

use crate::backend::{Backend, FileBackend, MemoryBackend};
use crate::config::{StoreConfig, SyncMode};
use crate::error::{StoreError, StoreResult};
use crate::footer::{Footer, IndexKind, FOOTER_SIZE};
use crate::header::{FileHeader, HEADER_SIZE};
use crate::traits::StoreReader;
use crate::transaction::Transaction;

/// The latest committed footer and where it lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Head {
    pub pos: TypedAddress<Footer>,
    pub footer: Footer,
}

/// An append-only, revisioned byte store.
///
/// A `Database` holds the authoritative image of every committed byte and
/// delegates persistence to a [`Backend`]. Committed bytes are never
/// modified, so any number of readers may walk older revisions while a
/// single writer [`Transaction`] appends the next one.
///
/// # Layout
///
/// ```text
/// [file header][footer r0][data r1][footer r1][data r2][footer r2] ...
/// ```
pub struct Database {
    backend: Box<dyn Backend>,
    config: StoreConfig,
    pub(crate) image: RwLock<Vec<u8>>,
    pub(crate) head: RwLock<Head>,
    pub(crate) writer: Mutex<()>,
}

impl Database {
    /// Open a store over `backend`, initializing it if the backend is empty.
    pub fn open(backend: impl Backend + 'static, config: StoreConfig) -> StoreResult<Self> {
        let mut image = backend.load()?;
        if image.is_empty() {
            if config.read_only {
                return Err(StoreError::ReadOnly);
            }
            image = Self::initialize(&backend)?;
        }

        let header = FileHeader::decode(&image)?;
        let pos = header.footer_pos;
        let footer = decode_footer(&image, pos.to_address())?;
        debug!(
            revision = footer.revision,
            footer = %pos,
            len = image.len(),
            "opened store"
        );

        Ok(Self {
            backend: Box::new(backend),
            config,
            image: RwLock::new(image),
            head: RwLock::new(Head { pos, footer }),
            writer: Mutex::new(()),
        })
    }

    /// Create an empty store held entirely in memory.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(MemoryBackend::new(), StoreConfig::default())
    }

    /// Open (or create) a file-backed store.
    ///
    /// A read-only configuration never creates the file.
    pub fn open_path(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        let backend = if config.read_only {
            FileBackend::open_read_only(path)?
        } else {
            FileBackend::open(path)?
        };
        Self::open(backend, config)
    }

    /// Write the file header and the revision-zero footer to an empty backend.
    fn initialize(backend: &dyn Backend) -> StoreResult<Vec<u8>> {
        let footer_pos = Address::new(HEADER_SIZE).align_up(8);
        let mut image = FileHeader::new(footer_pos.into()).encode().to_vec();
        image.resize(footer_pos.absolute() as usize, 0);
        image.extend_from_slice(&Footer::genesis(now_ms()).encode());

        backend.append(0, &image)?;
        backend.sync()?;
        debug!(len = image.len(), "initialized empty store");
        Ok(image)
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Total bytes committed, including the header and every footer.
    pub fn size(&self) -> u64 {
        self.image.read().expect("lock poisoned").len() as u64
    }

    /// The most recently committed revision.
    pub fn current_revision(&self) -> RevisionNumber {
        self.head.read().expect("lock poisoned").footer.revision
    }

    /// The footer of the most recent revision.
    pub fn head_footer(&self) -> Footer {
        self.head.read().expect("lock poisoned").footer
    }

    pub(crate) fn head(&self) -> Head {
        *self.head.read().expect("lock poisoned")
    }

    /// Address of the footer recorded for `revision`.
    ///
    /// [`HEAD_REVISION`] names the current revision. Walks the footer chain
    /// backwards from the head, so the cost is proportional to the number of
    /// revisions newer than the one requested.
    pub fn older_revision_footer_pos(
        &self,
        revision: RevisionNumber,
    ) -> StoreResult<TypedAddress<Footer>> {
        Ok(self.find_revision(revision)?.pos)
    }

    /// The footer recorded for `revision`.
    pub fn footer(&self, revision: RevisionNumber) -> StoreResult<Footer> {
        Ok(self.find_revision(revision)?.footer)
    }

    /// Header-block address of a named index as of `revision`.
    pub fn index_root(
        &self,
        kind: IndexKind,
        revision: RevisionNumber,
    ) -> StoreResult<Option<Address>> {
        Ok(self.footer(revision)?.index_root(kind))
    }

    /// Every revision's footer, newest first.
    pub fn revisions(&self) -> StoreResult<Vec<(TypedAddress<Footer>, Footer)>> {
        let head = self.head();
        let mut result = vec![(head.pos, head.footer)];
        let mut footer = head.footer;
        while footer.revision > 0 {
            let pos = footer.prev;
            footer = self.read_footer(pos)?;
            result.push((pos, footer));
        }
        Ok(result)
    }

    /// Start the single write transaction. Blocks while another transaction
    /// on this database is open.
    pub fn begin(&self) -> StoreResult<Transaction<'_>> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        Transaction::new(self)
    }

    fn find_revision(&self, revision: RevisionNumber) -> StoreResult<Head> {
        let head = self.head();
        if revision == HEAD_REVISION {
            return Ok(head);
        }
        if revision > head.footer.revision {
            return Err(StoreError::UnknownRevision {
                requested: revision,
                current: head.footer.revision,
            });
        }

        let mut current = head;
        while current.footer.revision > revision {
            let pos = current.footer.prev;
            let footer = self.read_footer(pos)?;
            if footer.revision >= current.footer.revision {
                warn!(footer = %pos, "footer chain revisions are not decreasing");
                return Err(StoreError::CorruptFooter {
                    addr: pos.to_address(),
                    reason: format!(
                        "revision {} follows revision {}",
                        footer.revision, current.footer.revision
                    ),
                });
            }
            current = Head { pos, footer };
        }
        if current.footer.revision != revision {
            return Err(StoreError::CorruptFooter {
                addr: current.pos.to_address(),
                reason: format!("revision {revision} is missing from the footer chain"),
            });
        }
        Ok(current)
    }

    fn read_footer(&self, pos: TypedAddress<Footer>) -> StoreResult<Footer> {
        let image = self.image.read().expect("lock poisoned");
        decode_footer(&image, pos.to_address())
    }

    /// Persist a committed transaction: `bytes` begins at `base` and ends
    /// with the new footer at `head.pos`.
    ///
    /// Once the append succeeds the bytes are part of the store whether or
    /// not the header is then repointed, so the image grows to match the
    /// backend before anything else can fail. A failure after that point
    /// leaves the previous revision current and the appended bytes
    /// unreferenced; the next transaction starts after them.
    pub(crate) fn publish(&self, base: Address, bytes: &[u8], head: Head) -> StoreResult<()> {
        self.backend.append(base.absolute(), bytes)?;
        {
            let mut image = self.image.write().expect("lock poisoned");
            debug_assert_eq!(image.len() as u64, base.absolute());
            image.extend_from_slice(bytes);
        }

        let header = FileHeader::new(head.pos).encode();
        if let Err(err) = self.repoint_header(&header) {
            warn!(footer = %head.pos, error = %err, "commit appended but not published");
            return Err(err);
        }

        self.image.write().expect("lock poisoned")[..HEADER_SIZE as usize]
            .copy_from_slice(&header);
        *self.head.write().expect("lock poisoned") = head;
        Ok(())
    }

    fn repoint_header(&self, header: &[u8]) -> StoreResult<()> {
        if self.config.sync == SyncMode::EveryCommit {
            self.backend.sync()?;
        }
        self.backend.write_header(header)?;
        if self.config.sync == SyncMode::EveryCommit {
            self.backend.sync()?;
        }
        Ok(())
    }
}

impl StoreReader for Database {
    fn read(&self, addr: Address, size: u64) -> StoreResult<Vec<u8>> {
        let image = self.image.read().expect("lock poisoned");
        Ok(slice(&image, addr, size)?.to_vec())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("revision", &self.current_revision())
            .field("size", &self.size())
            .finish()
    }
}

pub(crate) fn slice(image: &[u8], addr: Address, size: u64) -> StoreResult<&[u8]> {
    let len = image.len() as u64;
    let start = addr.absolute();
    match start.checked_add(size) {
        Some(end) if end <= len => Ok(&image[start as usize..end as usize]),
        _ => Err(StoreError::OutOfRange { addr, size, len }),
    }
}

fn decode_footer(image: &[u8], addr: Address) -> StoreResult<Footer> {
    let bytes = slice(image, addr, FOOTER_SIZE).map_err(|_| StoreError::CorruptFooter {
        addr,
        reason: "footer lies outside the store".into(),
    })?;
    Footer::decode(addr, bytes).inspect_err(|e| warn!(footer = %addr, error = %e, "bad footer"))
}

pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
