//! Configuration epoch store.
//!
//! Holds the CID codec configurations that are currently decodable, keyed by
//! rotation tag. At most one configuration is active (used for minting); any
//! number of others may be retiring (still decodable until their grace period
//! elapses) as long as their tags differ.
//!
//! # Concurrency
//!
//! Readers load an immutable [`EpochSnapshot`] through [`ArcSwap`] and never
//! block. Writers (`install`, `retire`, `revoke`, `purge`) are serialized by a
//! mutex, build a new snapshot and swap it in, so a concurrent reader sees
//! either the old or the new configuration set, never a mix.
//!
//! Every state change produces a new [`Epoch`] with a fresh revision number.
//! Caches key their entries on that revision so a retirement invalidates them.

use crate::cid::{CidCodec, CidConfig, RotationTag, ServerId, DEFAULT_ROTATION_BITS, MAX_ROTATION_BITS};
use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default time a replaced configuration stays decodable
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(300);

/// Store-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochStoreConfig {
    /// Width of the rotation tag in the first CID byte
    pub rotation_bits: u8,

    /// How long a retiring configuration keeps decoding
    pub grace_period: Duration,
}

impl Default for EpochStoreConfig {
    fn default() -> Self {
        Self {
            rotation_bits: DEFAULT_ROTATION_BITS,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Lifecycle state of one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState {
    /// Used for minting new CIDs and decodable
    Active,
    /// Decodable until `grace` has elapsed since `since`, never used for minting
    Retiring { since: Instant, grace: Duration },
    /// Rejected
    Retired,
}

/// One installed configuration and its validity window.
#[derive(Debug)]
pub struct Epoch {
    codec: CidCodec,
    revision: u64,
    created_at: Instant,
    state: EpochState,
}

impl Epoch {
    pub fn codec(&self) -> &CidCodec {
        &self.codec
    }

    pub fn config(&self) -> &CidConfig {
        self.codec.config()
    }

    pub fn tag(&self) -> RotationTag {
        self.codec.tag()
    }

    /// Monotonic revision, unique per state change across the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn state(&self) -> EpochState {
        self.state
    }

    /// Instant after which the configuration stops decoding regardless of
    /// state, if it has a lifetime.
    pub fn expires_at(&self) -> Option<Instant> {
        let lifetime = Duration::from_secs(self.config().lifetime_secs?);
        self.created_at.checked_add(lifetime)
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        match self.config().lifetime_secs {
            Some(secs) => now.saturating_duration_since(self.created_at) >= Duration::from_secs(secs),
            None => false,
        }
    }

    /// Whether CIDs carrying this configuration's tag decode at `now`.
    pub fn is_decodable_at(&self, now: Instant) -> bool {
        if self.is_expired_at(now) {
            return false;
        }
        match self.state {
            EpochState::Active => true,
            EpochState::Retiring { since, grace } => now.saturating_duration_since(since) < grace,
            EpochState::Retired => false,
        }
    }

    /// Whether the configuration may mint at `now`.
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.state == EpochState::Active && !self.is_expired_at(now)
    }

    fn with_state(&self, state: EpochState, revision: u64) -> Epoch {
        Epoch {
            codec: self.codec.clone(),
            revision,
            created_at: self.created_at,
            state,
        }
    }
}

/// Result of decoding a CID against a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCid {
    pub server_id: ServerId,
    pub tag: RotationTag,
    pub revision: u64,
}

/// Immutable view of every installed configuration.
#[derive(Debug, Clone)]
pub struct EpochSnapshot {
    rotation_bits: u8,
    slots: Vec<Option<Arc<Epoch>>>,
    active: Option<RotationTag>,
}

impl EpochSnapshot {
    fn empty(rotation_bits: u8) -> Self {
        Self {
            rotation_bits,
            slots: vec![None; 1usize << rotation_bits],
            active: None,
        }
    }

    pub fn rotation_bits(&self) -> u8 {
        self.rotation_bits
    }

    /// Configuration stored under `tag`, whatever its state.
    pub fn get(&self, tag: RotationTag) -> Option<&Arc<Epoch>> {
        self.slots.get(tag.value() as usize)?.as_ref()
    }

    /// Decodable configuration for `tag` at `now`.
    pub fn lookup(&self, tag: RotationTag, now: Instant) -> Result<&Arc<Epoch>> {
        match self.get(tag) {
            Some(epoch) if epoch.is_decodable_at(now) => Ok(epoch),
            _ => Err(Error::UnknownConfig(tag)),
        }
    }

    /// Configuration used for minting at `now`.
    pub fn active(&self, now: Instant) -> Option<&Arc<Epoch>> {
        let epoch = self.get(self.active?)?;
        epoch.is_active_at(now).then_some(epoch)
    }

    /// CID length of the active configuration. This is the short-header
    /// length hint for incoming datagrams.
    pub fn short_cid_len(&self, now: Instant) -> Option<usize> {
        self.active(now).map(|epoch| epoch.codec().cid_len())
    }

    /// Short-header CID length for a DCID starting with `first_byte`.
    ///
    /// A tag that still decodes supplies its own length, so traffic under a
    /// retiring configuration keeps routing when a rotation changes the CID
    /// length. Otherwise the active configuration's length applies.
    pub fn short_cid_len_for(&self, first_byte: u8, now: Instant) -> Option<usize> {
        let tag = RotationTag::from_first_byte(first_byte, self.rotation_bits);
        match self.lookup(tag, now) {
            Ok(epoch) => Some(epoch.codec().cid_len()),
            Err(_) => self.short_cid_len(now),
        }
    }

    /// Installed configurations in tag order.
    pub fn epochs(&self) -> impl Iterator<Item = &Arc<Epoch>> {
        self.slots.iter().flatten()
    }

    /// Decode `cid` using only the configuration named by its rotation tag.
    pub fn decode(&self, cid: &[u8], now: Instant) -> Result<DecodedCid> {
        let first = *cid.first().ok_or(Error::CidLength {
            expected: 1,
            actual: 0,
        })?;
        let tag = RotationTag::from_first_byte(first, self.rotation_bits);
        let epoch = self.lookup(tag, now)?;
        let server_id = epoch.codec().decode(cid)?;

        Ok(DecodedCid {
            server_id,
            tag,
            revision: epoch.revision(),
        })
    }
}

/// Copy-on-write store of CID codec configurations.
pub struct EpochStore {
    config: EpochStoreConfig,
    current: ArcSwap<EpochSnapshot>,
    /// Serializes writers; holds the next revision number
    writer: Mutex<u64>,
}

impl EpochStore {
    pub fn new(config: EpochStoreConfig) -> Result<Self> {
        if config.rotation_bits == 0 || config.rotation_bits > MAX_ROTATION_BITS {
            return Err(Error::InvalidConfig(format!(
                "rotation_bits must be 1-{}, got {}",
                MAX_ROTATION_BITS, config.rotation_bits
            )));
        }

        Ok(Self {
            config,
            current: ArcSwap::from_pointee(EpochSnapshot::empty(config.rotation_bits)),
            writer: Mutex::new(1),
        })
    }

    pub fn config(&self) -> &EpochStoreConfig {
        &self.config
    }

    pub fn rotation_bits(&self) -> u8 {
        self.config.rotation_bits
    }

    /// Current snapshot. Readers hold it for as long as they need a
    /// consistent view.
    pub fn snapshot(&self) -> Arc<EpochSnapshot> {
        self.current.load_full()
    }

    pub fn lookup(&self, tag: RotationTag) -> Result<Arc<Epoch>> {
        self.lookup_at(tag, Instant::now())
    }

    pub fn lookup_at(&self, tag: RotationTag, now: Instant) -> Result<Arc<Epoch>> {
        self.current.load().lookup(tag, now).cloned()
    }

    /// Configuration currently used for minting.
    pub fn active(&self) -> Option<Arc<Epoch>> {
        self.active_at(Instant::now())
    }

    pub fn active_at(&self, now: Instant) -> Option<Arc<Epoch>> {
        self.current.load().active(now).cloned()
    }

    /// Decode a CID against the current snapshot.
    pub fn decode_at(&self, cid: &[u8], now: Instant) -> Result<DecodedCid> {
        self.current.load().decode(cid, now)
    }

    /// Install `config` as the active configuration.
    ///
    /// The previously active configuration, if any, starts retiring. Fails
    /// with [`Error::ConfigConflict`] if the tag is held by a configuration
    /// that is still decodable.
    pub fn install(&self, config: CidConfig) -> Result<Arc<Epoch>> {
        self.install_at(config, Instant::now())
    }

    pub fn install_at(&self, config: CidConfig, now: Instant) -> Result<Arc<Epoch>> {
        let codec = CidCodec::new(&config, self.config.rotation_bits)?;
        let tag = codec.tag();

        let mut next_revision = self.writer.lock();
        let current = self.current.load_full();

        if current.get(tag).is_some_and(|occupant| occupant.is_decodable_at(now)) {
            return Err(Error::ConfigConflict(tag));
        }

        let mut snapshot = (*current).clone();
        if let Some(previous) = current.active.and_then(|t| current.get(t)) {
            let retiring = EpochState::Retiring {
                since: now,
                grace: self.config.grace_period,
            };
            let demoted = Arc::new(previous.with_state(retiring, take_revision(&mut next_revision)));
            info!(
                tag = %demoted.tag(),
                grace_secs = self.config.grace_period.as_secs(),
                "CID configuration retiring"
            );
            let slot = demoted.tag().value() as usize;
            snapshot.slots[slot] = Some(demoted);
        }

        let epoch = Arc::new(Epoch {
            codec,
            revision: take_revision(&mut next_revision),
            created_at: now,
            state: EpochState::Active,
        });
        snapshot.slots[tag.value() as usize] = Some(Arc::clone(&epoch));
        snapshot.active = Some(tag);
        self.current.store(Arc::new(snapshot));

        info!(
            tag = %tag,
            kind = %epoch.codec().kind(),
            cid_len = epoch.codec().cid_len(),
            revision = epoch.revision(),
            "CID configuration installed"
        );
        Ok(epoch)
    }

    /// Stop minting with `tag` and start its grace period.
    ///
    /// Retiring an already retiring configuration leaves its deadline
    /// unchanged.
    pub fn retire(&self, tag: RotationTag) -> Result<()> {
        self.retire_at(tag, Instant::now())
    }

    pub fn retire_at(&self, tag: RotationTag, now: Instant) -> Result<()> {
        let mut next_revision = self.writer.lock();
        let current = self.current.load_full();

        let occupant = current.get(tag).ok_or(Error::UnknownConfig(tag))?;
        match occupant.state() {
            EpochState::Active => {}
            EpochState::Retiring { .. } => return Ok(()),
            EpochState::Retired => return Err(Error::UnknownConfig(tag)),
        }

        let retiring = EpochState::Retiring {
            since: now,
            grace: self.config.grace_period,
        };
        let epoch = Arc::new(occupant.with_state(retiring, take_revision(&mut next_revision)));

        let mut snapshot = (*current).clone();
        snapshot.slots[tag.value() as usize] = Some(epoch);
        if snapshot.active == Some(tag) {
            snapshot.active = None;
        }
        self.current.store(Arc::new(snapshot));

        info!(tag = %tag, grace_secs = self.config.grace_period.as_secs(), "CID configuration retiring");
        Ok(())
    }

    /// Reject CIDs carrying `tag` immediately, skipping the grace period.
    pub fn revoke(&self, tag: RotationTag) -> Result<()> {
        let mut next_revision = self.writer.lock();
        let current = self.current.load_full();

        let occupant = current.get(tag).ok_or(Error::UnknownConfig(tag))?;
        if occupant.state() == EpochState::Retired {
            return Ok(());
        }
        let epoch = Arc::new(occupant.with_state(EpochState::Retired, take_revision(&mut next_revision)));

        let mut snapshot = (*current).clone();
        snapshot.slots[tag.value() as usize] = Some(epoch);
        if snapshot.active == Some(tag) {
            snapshot.active = None;
        }
        self.current.store(Arc::new(snapshot));

        info!(tag = %tag, "CID configuration revoked");
        Ok(())
    }

    /// Drop every configuration that no longer decodes. Returns the number
    /// removed.
    pub fn purge(&self) -> usize {
        self.purge_at(Instant::now())
    }

    pub fn purge_at(&self, now: Instant) -> usize {
        let _writer = self.writer.lock();
        let current = self.current.load_full();

        let mut snapshot = (*current).clone();
        let mut removed = 0;
        for slot in snapshot.slots.iter_mut() {
            if slot.as_ref().is_some_and(|epoch| !epoch.is_decodable_at(now)) {
                *slot = None;
                removed += 1;
            }
        }
        if removed == 0 {
            return 0;
        }
        if snapshot.active.is_some_and(|tag| snapshot.get(tag).is_none()) {
            snapshot.active = None;
        }
        self.current.store(Arc::new(snapshot));

        debug!(removed, "purged stale CID configurations");
        removed
    }
}

impl std::fmt::Debug for EpochStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochStore")
            .field("config", &self.config)
            .field("snapshot", &self.current.load())
            .finish()
    }
}

fn take_revision(next: &mut u64) -> u64 {
    let revision = *next;
    *next += 1;
    revision
}
