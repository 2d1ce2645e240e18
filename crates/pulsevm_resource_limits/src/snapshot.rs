use pulsevm_chainbase::Database;
use pulsevm_error::ChainError;
use pulsevm_name::Name;
use pulsevm_proc_macros::{NumBytes, Read, Write};
use pulsevm_serialization::{NumBytes, Read, ReadError, Write, WriteError};
use spdlog::info;

use crate::{
    resource::{
        PendingResourceLimits, ResourceLimits, ResourceLimitsConfig, ResourceLimitsState,
        ResourceUsage, ResourceWeight,
    },
    resource_limits::ResourceLimitsManager,
    utils::pulse_assert,
};

pub const MINIMUM_SNAPSHOT_VERSION: u32 = 3;
pub const CURRENT_SNAPSHOT_VERSION: u32 = 4;

pub type ResourceUsageRow = ResourceUsage;
pub type ResourceLimitsStateRow = ResourceLimitsState;
pub type ResourceLimitsConfigRow = ResourceLimitsConfig;

/// Limits row before staged limits were tracked; every row is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Read, Write, NumBytes)]
pub struct ResourceLimitsV3 {
    pub owner: Name,
    pub net_weight: i64,
    pub cpu_weight: i64,
    pub ram_bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Read, Write, NumBytes)]
pub struct ResourceLimitsV4 {
    pub pending: bool,
    pub owner: Name,
    pub net_weight: i64,
    pub cpu_weight: i64,
    pub ram_bytes: i64,
}

impl ResourceLimitsV4 {
    pub fn initialize_from(legacy: ResourceLimitsV3) -> Self {
        ResourceLimitsV4 {
            pending: false,
            owner: legacy.owner,
            net_weight: legacy.net_weight,
            cpu_weight: legacy.cpu_weight,
            ram_bytes: legacy.ram_bytes,
        }
    }

    fn from_limits(limits: &ResourceLimits, pending: bool) -> Self {
        ResourceLimitsV4 {
            pending,
            owner: limits.owner,
            net_weight: limits.net_weight.as_legacy(),
            cpu_weight: limits.cpu_weight.as_legacy(),
            ram_bytes: limits.ram_bytes.as_legacy(),
        }
    }

    fn to_limits(self) -> Result<ResourceLimits, ChainError> {
        let weight = |value: i64| {
            ResourceWeight::try_from(value).map_err(|_| {
                ChainError::SerializationError(format!(
                    "invalid resource weight {} for account {}",
                    value, self.owner
                ))
            })
        };
        Ok(ResourceLimits::new(
            self.owner,
            weight(self.net_weight)?,
            weight(self.cpu_weight)?,
            weight(self.ram_bytes)?,
        ))
    }
}

/// Limits rows of one snapshot, in the layout of the version they were
/// written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLimitsRows {
    V3(Vec<ResourceLimitsV3>),
    V4(Vec<ResourceLimitsV4>),
}

impl SnapshotLimitsRows {
    pub fn version(&self) -> u32 {
        match self {
            SnapshotLimitsRows::V3(_) => 3,
            SnapshotLimitsRows::V4(_) => 4,
        }
    }

    /// Rows upgraded to the current layout.
    pub fn into_current(self) -> Vec<ResourceLimitsV4> {
        match self {
            SnapshotLimitsRows::V3(rows) => {
                rows.into_iter().map(ResourceLimitsV4::initialize_from).collect()
            }
            SnapshotLimitsRows::V4(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SnapshotLimitsRows::V3(rows) => rows.len(),
            SnapshotLimitsRows::V4(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub limits: SnapshotLimitsRows,
    pub usage: Vec<ResourceUsageRow>,
    pub state: ResourceLimitsStateRow,
    pub config: ResourceLimitsConfigRow,
}

pub fn check_snapshot_version(version: u32) -> Result<(), ChainError> {
    pulse_assert(
        (MINIMUM_SNAPSHOT_VERSION..=CURRENT_SNAPSHOT_VERSION).contains(&version),
        ChainError::SnapshotVersion {
            version,
            minimum: MINIMUM_SNAPSHOT_VERSION,
            current: CURRENT_SNAPSHOT_VERSION,
        },
    )
}

impl ResourceSnapshot {
    pub fn version(&self) -> u32 {
        self.limits.version()
    }

    /// Decodes a packed snapshot, reporting an unsupported version as such
    /// rather than as malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Self, ChainError> {
        let version = u32::read(bytes, &mut 0)?;
        check_snapshot_version(version)?;
        ResourceSnapshot::unpack(bytes).map_err(ChainError::from)
    }
}

impl NumBytes for ResourceSnapshot {
    fn num_bytes(&self) -> usize {
        let limits = match &self.limits {
            SnapshotLimitsRows::V3(rows) => rows.num_bytes(),
            SnapshotLimitsRows::V4(rows) => rows.num_bytes(),
        };
        self.version().num_bytes()
            + limits
            + self.usage.num_bytes()
            + self.state.num_bytes()
            + self.config.num_bytes()
    }
}

impl Read for ResourceSnapshot {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        let limits = match u32::read(bytes, pos)? {
            3 => SnapshotLimitsRows::V3(Vec::read(bytes, pos)?),
            4 => SnapshotLimitsRows::V4(Vec::read(bytes, pos)?),
            _ => return Err(ReadError::ParseError),
        };
        Ok(ResourceSnapshot {
            limits,
            usage: Vec::read(bytes, pos)?,
            state: ResourceLimitsState::read(bytes, pos)?,
            config: ResourceLimitsConfig::read(bytes, pos)?,
        })
    }
}

impl Write for ResourceSnapshot {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        self.version().write(bytes, pos)?;
        match &self.limits {
            SnapshotLimitsRows::V3(rows) => rows.write(bytes, pos)?,
            SnapshotLimitsRows::V4(rows) => rows.write(bytes, pos)?,
        }
        self.usage.write(bytes, pos)?;
        self.state.write(bytes, pos)?;
        self.config.write(bytes, pos)
    }
}

/// Exports the resource tables. Committed limit rows come first, then staged
/// ones, each in owner order.
pub fn write_snapshot(db: &Database) -> Result<ResourceSnapshot, ChainError> {
    let committed = db.rows::<ResourceLimits>()?;
    let pending = db.rows::<PendingResourceLimits>()?;
    let limits = committed
        .iter()
        .map(|row| ResourceLimitsV4::from_limits(row, false))
        .chain(pending.iter().map(|row| ResourceLimitsV4::from_limits(&row.0, true)))
        .collect();
    Ok(ResourceSnapshot {
        limits: SnapshotLimitsRows::V4(limits),
        usage: db.rows::<ResourceUsage>()?,
        state: ResourceLimitsManager::get_state(db)?,
        config: ResourceLimitsManager::get_config(db)?,
    })
}

/// Every account needs a committed limits row and a usage row, staged rows
/// need a committed row to replace, and the state totals must match the
/// limits in force once staged rows are applied.
fn check_imported_rows(db: &Database, state: &ResourceLimitsState) -> Result<(), ChainError> {
    for pending in db.rows::<PendingResourceLimits>()? {
        pulse_assert(
            db.exists::<ResourceLimits>(pending.0.owner),
            ChainError::SerializationError(format!(
                "staged limits for account {} without committed limits",
                pending.0.owner
            )),
        )?;
    }

    let committed = db.rows::<ResourceLimits>()?;
    let usage = db.rows::<ResourceUsage>()?;
    pulse_assert(
        committed.len() == usage.len(),
        ChainError::SerializationError(format!(
            "{} limit rows but {} usage rows",
            committed.len(),
            usage.len()
        )),
    )?;

    let overflow = || ChainError::SerializationError("resource weight totals overflow".to_owned());
    let (mut net, mut cpu, mut ram) = (0u64, 0u64, 0u64);
    for row in committed {
        pulse_assert(
            db.exists::<ResourceUsage>(row.owner),
            ChainError::SerializationError(format!("no usage row for account {}", row.owner)),
        )?;
        let limits = db.find::<PendingResourceLimits>(row.owner)?.map_or(row, |row| row.0);
        net = net.checked_add(limits.net_weight.weight()).ok_or_else(overflow)?;
        cpu = cpu.checked_add(limits.cpu_weight.weight()).ok_or_else(overflow)?;
        ram = ram.checked_add(limits.ram_bytes.weight()).ok_or_else(overflow)?;
    }
    pulse_assert(
        (net, cpu, ram)
            == (state.total_net_weight, state.total_cpu_weight, state.total_ram_bytes),
        ChainError::SerializationError(format!(
            "state totals net {} cpu {} ram {} do not match account rows net {} cpu {} ram {}",
            state.total_net_weight, state.total_cpu_weight, state.total_ram_bytes, net, cpu, ram
        )),
    )
}

/// Loads a snapshot into a database without resource tables. Nothing is
/// written if any row is rejected.
pub fn read_snapshot(db: &mut Database, snapshot: &ResourceSnapshot) -> Result<(), ChainError> {
    let version = snapshot.version();
    check_snapshot_version(version)?;
    snapshot.config.validate()?;

    let mut session = db.undo_session();
    session.insert(&snapshot.config)?;
    session.insert(&snapshot.state)?;
    for row in snapshot.limits.clone().into_current() {
        let limits = row.to_limits()?;
        if row.pending {
            session.insert(&PendingResourceLimits(limits))?;
        } else {
            session.insert(&limits)?;
        }
    }
    for usage in &snapshot.usage {
        session.insert(usage)?;
    }
    check_imported_rows(&session, &snapshot.state)?;
    session.commit()?;

    info!(
        "imported resource limits snapshot v{}: {} limit rows, {} usage rows",
        version,
        snapshot.limits.len(),
        snapshot.usage.len()
    );
    Ok(())
}
