//! Configuration for the TideFS services.
//!
//! Config files are line-oriented `KEY=value` with `#` comments. Each service
//! has its own typed config struct with defaults; loading validates and fails
//! fast on malformed lines or unusable combinations.

use crate::error::{Result, TideError};
use crate::types::{NodeRole, NodeType};
use std::collections::HashMap;
use std::path::Path;

/// Parse a `KEY=value` config file into ordered pairs.
///
/// Blank lines and `#` comments are skipped; a non-comment line without `=`
/// is an error.
pub fn parse_kv_file(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TideError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_kv_str(&content)
}

fn parse_kv_str(content: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq) = line.find('=') else {
            return Err(TideError::Config(format!(
                "invalid config line {}: {}",
                line_no + 1,
                raw
            )));
        };
        let key = line[..eq].trim().to_string();
        let value = line[eq + 1..].trim().to_string();
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| TideError::Config(format!("invalid {} value: {}", key, value)))
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| TideError::Config(format!("invalid {} value: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TideError::Config(format!("invalid {} value: {}", key, value))),
    }
}

fn parse_node_type(value: &str) -> Result<NodeType> {
    match value.to_ascii_lowercase().as_str() {
        "real" => Ok(NodeType::Real),
        "virtual" => Ok(NodeType::Virtual),
        "optical" => Ok(NodeType::Optical),
        _ => Err(TideError::Config(format!("invalid node type: {}", value))),
    }
}

fn parse_role(value: &str) -> NodeRole {
    match value.to_ascii_lowercase().as_str() {
        "secondary" | "slave" => NodeRole::Secondary,
        _ => NodeRole::Primary,
    }
}

fn split_list(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// MDS
// ---------------------------------------------------------------------------

/// A statically configured storage node, used when no scheduler is present.
#[derive(Debug, Clone)]
pub struct StaticNodeEntry {
    pub node_id: String,
    pub address: String,
    pub node_type: NodeType,
    pub weight: u32,
    pub virtual_node_count: u32,
    pub disks: Vec<String>,
}

/// Metadata service configuration (`MDS_*` plus archive knobs).
#[derive(Debug, Clone)]
pub struct MdsConfig {
    pub db_path: String,
    pub listen_addr: String,
    /// Empty means no scheduler: placement comes from `nodes`.
    pub scheduler_addr: String,
    pub scheduler_refresh_ms: u64,
    pub chunk_size: u64,
    pub replica: u32,
    pub nodes: Vec<StaticNodeEntry>,
    pub enable_optical_archive: bool,
    pub archive_trigger_bytes: u64,
    pub archive_target_bytes: u64,
    pub cold_file_ttl_sec: u64,
    pub archive_scan_interval_ms: u64,
    pub archive_max_chunks_per_round: u32,
}

impl Default for MdsConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            listen_addr: "127.0.0.1:9400".to_string(),
            scheduler_addr: String::new(),
            scheduler_refresh_ms: 2000,
            chunk_size: 4 * 1024 * 1024,
            replica: 2,
            nodes: Vec::new(),
            enable_optical_archive: false,
            archive_trigger_bytes: 10 * 1024 * 1024 * 1024,
            archive_target_bytes: 8 * 1024 * 1024 * 1024,
            cold_file_ttl_sec: 3600,
            archive_scan_interval_ms: 5000,
            archive_max_chunks_per_round: 64,
        }
    }
}

impl MdsConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let pairs = parse_kv_file(path)?;
        Self::from_pairs(&pairs)
    }

    fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut cfg = Self::default();
        let mut disks_by_node: HashMap<String, Vec<String>> = HashMap::new();

        for (key, value) in pairs {
            match key.as_str() {
                "MDS_DB_PATH" => cfg.db_path = value.clone(),
                "LISTEN_ADDR" => cfg.listen_addr = value.clone(),
                "SCHEDULER_ADDR" => cfg.scheduler_addr = value.clone(),
                "SCHEDULER_REFRESH_MS" => cfg.scheduler_refresh_ms = parse_u64(key, value)?,
                "CHUNK_SIZE" => cfg.chunk_size = parse_u64(key, value)?,
                "REPLICA" => cfg.replica = parse_u32(key, value)?,
                "ENABLE_OPTICAL_ARCHIVE" => cfg.enable_optical_archive = parse_bool(key, value)?,
                "ARCHIVE_TRIGGER_BYTES" => cfg.archive_trigger_bytes = parse_u64(key, value)?,
                "ARCHIVE_TARGET_BYTES" => cfg.archive_target_bytes = parse_u64(key, value)?,
                "COLD_FILE_TTL_SEC" => cfg.cold_file_ttl_sec = parse_u64(key, value)?,
                "ARCHIVE_SCAN_INTERVAL_MS" => {
                    cfg.archive_scan_interval_ms = parse_u64(key, value)?
                }
                "ARCHIVE_MAX_CHUNKS_PER_ROUND" => {
                    cfg.archive_max_chunks_per_round = parse_u32(key, value)?
                }
                "NODES" => {
                    cfg.nodes.clear();
                    let mut seen = HashMap::new();
                    for item in split_list(value, ';') {
                        let node = parse_node_entry(&item)?;
                        if seen.insert(node.node_id.clone(), true).is_some() {
                            return Err(TideError::Config(format!(
                                "duplicated node id in NODES: {}",
                                node.node_id
                            )));
                        }
                        cfg.nodes.push(node);
                    }
                }
                "DISKS" => {
                    for entry in split_list(value, ';') {
                        let Some(sep) = entry.find(':') else {
                            return Err(TideError::Config(format!(
                                "invalid DISKS entry (expected node_id:disk1,disk2): {}",
                                entry
                            )));
                        };
                        let node_id = entry[..sep].trim().to_string();
                        let disks = split_list(&entry[sep + 1..], ',');
                        disks_by_node.insert(node_id, disks);
                    }
                }
                _ => {}
            }
        }

        for node in &mut cfg.nodes {
            if let Some(disks) = disks_by_node.get(&node.node_id) {
                node.disks = disks.clone();
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.db_path.is_empty() {
            return Err(TideError::Config("MDS_DB_PATH is required".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(TideError::Config("CHUNK_SIZE must be positive".to_string()));
        }
        if self.archive_target_bytes > self.archive_trigger_bytes {
            self.archive_target_bytes = self.archive_trigger_bytes;
        }
        if self.archive_max_chunks_per_round == 0 {
            self.archive_max_chunks_per_round = 1;
        }
        if self.nodes.is_empty() && self.scheduler_addr.is_empty() {
            return Err(TideError::Config(
                "NODES is required when SCHEDULER_ADDR is not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse one `NODES` item: `node_id@address[,type][,weight][,vnode_count]`,
/// fields also accepted as `key=value` in any order.
fn parse_node_entry(item: &str) -> Result<StaticNodeEntry> {
    let parts = split_list(item, ',');
    if parts.is_empty() {
        return Err(TideError::Config("empty NODES entry".to_string()));
    }
    let Some(at) = parts[0].find('@') else {
        return Err(TideError::Config(format!(
            "invalid NODES entry (expected node_id@address): {}",
            item
        )));
    };

    let node_id = parts[0][..at].trim().to_string();
    let address = parts[0][at + 1..].trim().to_string();
    if node_id.is_empty() || address.is_empty() {
        return Err(TideError::Config(format!("invalid NODES entry: {}", item)));
    }

    let mut node = StaticNodeEntry {
        node_id,
        address,
        node_type: NodeType::Real,
        weight: 1,
        virtual_node_count: 1,
        disks: Vec::new(),
    };

    let mut positional = 0usize;
    for token in parts.iter().skip(1) {
        let (key, value) = match token.find('=') {
            Some(eq) => (
                token[..eq].trim().to_ascii_lowercase(),
                token[eq + 1..].trim().to_string(),
            ),
            None => {
                let key = match positional {
                    0 => "type",
                    1 => "weight",
                    2 => "virtual_node_count",
                    _ => {
                        return Err(TideError::Config(format!(
                            "too many positional fields in NODES entry: {}",
                            item
                        )))
                    }
                };
                positional += 1;
                (key.to_string(), token.clone())
            }
        };

        match key.as_str() {
            "type" | "node_type" => node.node_type = parse_node_type(&value)?,
            "weight" => {
                node.weight = parse_u32("weight", &value)?;
                if node.weight == 0 {
                    return Err(TideError::Config(format!(
                        "invalid weight in NODES entry: {}",
                        item
                    )));
                }
            }
            "virtual_node_count" | "vnode_count" => {
                node.virtual_node_count = parse_u32("virtual_node_count", &value)?;
                if node.virtual_node_count == 0 {
                    return Err(TideError::Config(format!(
                        "invalid virtual_node_count in NODES entry: {}",
                        item
                    )));
                }
            }
            other => {
                return Err(TideError::Config(format!(
                    "unknown NODES option '{}' in entry: {}",
                    other, item
                )))
            }
        }
    }

    if node.node_type == NodeType::Real {
        node.virtual_node_count = 1;
    }
    Ok(node)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Scheduler configuration: failure-detection timeouts and actuator templates.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub listen_addr: String,
    pub suspect_timeout_ms: u64,
    pub dead_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub start_cmd_template: String,
    pub stop_cmd_template: String,
    pub reboot_cmd_template: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9300".to_string(),
            suspect_timeout_ms: 6000,
            dead_timeout_ms: 15_000,
            tick_interval_ms: 1000,
            start_cmd_template: String::new(),
            stop_cmd_template: String::new(),
            reboot_cmd_template: String::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        for (key, value) in parse_kv_file(path)? {
            match key.as_str() {
                "LISTEN_ADDR" => cfg.listen_addr = value,
                "SUSPECT_TIMEOUT_MS" => cfg.suspect_timeout_ms = parse_u64(&key, &value)?,
                "DEAD_TIMEOUT_MS" => cfg.dead_timeout_ms = parse_u64(&key, &value)?,
                "TICK_INTERVAL_MS" => cfg.tick_interval_ms = parse_u64(&key, &value)?,
                "START_CMD_TEMPLATE" => cfg.start_cmd_template = value,
                "STOP_CMD_TEMPLATE" => cfg.stop_cmd_template = value,
                "REBOOT_CMD_TEMPLATE" => cfg.reboot_cmd_template = value,
                _ => {}
            }
        }
        if cfg.suspect_timeout_ms >= cfg.dead_timeout_ms {
            return Err(TideError::Config(
                "SUSPECT_TIMEOUT_MS must be below DEAD_TIMEOUT_MS".to_string(),
            ));
        }
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// Storage node (real / virtual / optical)
// ---------------------------------------------------------------------------

/// Storage node configuration; `NODE_TYPE` selects the backend, the rest of
/// the keys split into shared replication/heartbeat settings and per-backend
/// sections.
#[derive(Debug, Clone)]
pub struct StorageNodeConfig {
    pub node_type: NodeType,
    pub node_id: String,
    pub node_address: String,
    pub listen_addr: String,
    pub scheduler_addr: String,
    pub group_id: String,
    pub node_role: NodeRole,
    pub peer_node_id: String,
    pub peer_address: String,
    pub replication_enabled: bool,
    pub replication_timeout_ms: u64,
    pub node_weight: u32,
    pub virtual_node_count: u32,
    pub heartbeat_interval_ms: u64,

    // Real backend
    /// `disk_id:mount_point` pairs separated by `;`.
    pub disks: String,
    /// Alternative to `disks`: one subdirectory per disk.
    pub data_root: String,

    // Virtual backend
    pub disk_ids: Vec<String>,
    pub read_bytes_per_sec: u64,
    pub write_bytes_per_sec: u64,
    pub read_base_latency_ms: u64,
    pub write_base_latency_ms: u64,
    pub jitter_ms: u64,
    pub disk_capacity_bytes: u64,
    pub mount_point_prefix: String,

    // Optical backend
    pub archive_root: String,
    pub max_image_size_bytes: u64,
}

impl Default for StorageNodeConfig {
    fn default() -> Self {
        Self {
            node_type: NodeType::Real,
            node_id: String::new(),
            node_address: String::new(),
            listen_addr: "127.0.0.1:9500".to_string(),
            scheduler_addr: String::new(),
            group_id: String::new(),
            node_role: NodeRole::Primary,
            peer_node_id: String::new(),
            peer_address: String::new(),
            replication_enabled: false,
            replication_timeout_ms: 2000,
            node_weight: 1,
            virtual_node_count: 1,
            heartbeat_interval_ms: 2000,
            disks: String::new(),
            data_root: String::new(),
            disk_ids: Vec::new(),
            read_bytes_per_sec: 0,
            write_bytes_per_sec: 0,
            read_base_latency_ms: 0,
            write_base_latency_ms: 0,
            jitter_ms: 0,
            disk_capacity_bytes: 10 * 1024 * 1024 * 1024,
            mount_point_prefix: "/optical".to_string(),
            archive_root: "/tmp/tidefs_optical".to_string(),
            max_image_size_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl StorageNodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        for (key, value) in parse_kv_file(path)? {
            match key.as_str() {
                "NODE_TYPE" => cfg.node_type = parse_node_type(&value)?,
                "NODE_ID" => cfg.node_id = value,
                "NODE_ADDRESS" => cfg.node_address = value,
                "LISTEN_ADDR" => cfg.listen_addr = value,
                "SCHEDULER_ADDR" => cfg.scheduler_addr = value,
                "GROUP_ID" => cfg.group_id = value,
                "NODE_ROLE" => cfg.node_role = parse_role(&value),
                "PEER_NODE_ID" => cfg.peer_node_id = value,
                "PEER_ADDRESS" => cfg.peer_address = value,
                "REPLICATION_ENABLED" => cfg.replication_enabled = parse_bool(&key, &value)?,
                "REPLICATION_TIMEOUT_MS" => cfg.replication_timeout_ms = parse_u64(&key, &value)?,
                "NODE_WEIGHT" => cfg.node_weight = parse_u32(&key, &value)?.max(1),
                "VIRTUAL_NODE_COUNT" => cfg.virtual_node_count = parse_u32(&key, &value)?.max(1),
                "HEARTBEAT_INTERVAL_MS" => cfg.heartbeat_interval_ms = parse_u64(&key, &value)?,
                "DISKS" => {
                    cfg.disks = value.clone();
                    cfg.disk_ids = split_list(&value, ',');
                }
                "DATA_ROOT" => cfg.data_root = value,
                "READ_BYTES_PER_SEC" => cfg.read_bytes_per_sec = parse_u64(&key, &value)?,
                "WRITE_BYTES_PER_SEC" => cfg.write_bytes_per_sec = parse_u64(&key, &value)?,
                "READ_MBPS" => cfg.read_bytes_per_sec = parse_u64(&key, &value)? * 1024 * 1024,
                "WRITE_MBPS" => cfg.write_bytes_per_sec = parse_u64(&key, &value)? * 1024 * 1024,
                "READ_BASE_LATENCY_MS" => cfg.read_base_latency_ms = parse_u64(&key, &value)?,
                "WRITE_BASE_LATENCY_MS" => cfg.write_base_latency_ms = parse_u64(&key, &value)?,
                "JITTER_MS" => cfg.jitter_ms = parse_u64(&key, &value)?,
                "DISK_CAPACITY_BYTES" => cfg.disk_capacity_bytes = parse_u64(&key, &value)?,
                "MOUNT_POINT_PREFIX" => cfg.mount_point_prefix = value,
                "ARCHIVE_ROOT" => cfg.archive_root = value,
                "MAX_IMAGE_SIZE_BYTES" => cfg.max_image_size_bytes = parse_u64(&key, &value)?,
                _ => {}
            }
        }

        match cfg.node_type {
            NodeType::Real => {
                if cfg.disks.is_empty() && cfg.data_root.is_empty() {
                    return Err(TideError::Config(
                        "real node requires DISKS or DATA_ROOT".to_string(),
                    ));
                }
            }
            NodeType::Virtual | NodeType::Optical => {
                if cfg.disk_ids.is_empty() {
                    cfg.disk_ids.push("disk-01".to_string());
                }
            }
        }
        Ok(cfg)
    }

    /// Effective group id: the node's own id when not configured.
    pub fn effective_group_id(&self) -> String {
        if self.group_id.is_empty() {
            self.node_id.clone()
        } else {
            self.group_id.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kv_basic() {
        let pairs = parse_kv_str("# comment\nA=1\n\n B = two \n").unwrap();
        assert_eq!(pairs, vec![("A".into(), "1".into()), ("B".into(), "two".into())]);
    }

    #[test]
    fn test_parse_kv_rejects_garbage() {
        assert!(parse_kv_str("not a pair").is_err());
    }

    #[test]
    fn test_mds_config_requires_db_path() {
        let pairs = vec![("SCHEDULER_ADDR".to_string(), "127.0.0.1:9300".to_string())];
        assert!(MdsConfig::from_pairs(&pairs).is_err());
    }

    #[test]
    fn test_mds_config_nodes_and_disks() {
        let pairs = parse_kv_str(
            "MDS_DB_PATH=/tmp/db\n\
             NODES=n1@127.0.0.1:9501,real,2;n2@127.0.0.1:9502,virtual,1,4\n\
             DISKS=n1:disk-01,disk-02;n2:disk-01\n",
        )
        .unwrap();
        let cfg = MdsConfig::from_pairs(&pairs).unwrap();
        assert_eq!(cfg.nodes.len(), 2);
        assert_eq!(cfg.nodes[0].weight, 2);
        assert_eq!(cfg.nodes[0].disks, vec!["disk-01", "disk-02"]);
        assert_eq!(cfg.nodes[1].node_type, NodeType::Virtual);
        assert_eq!(cfg.nodes[1].virtual_node_count, 4);
    }

    #[test]
    fn test_node_entry_real_forces_single_vnode() {
        let node = parse_node_entry("n1@h:1,real,3,7").unwrap();
        assert_eq!(node.virtual_node_count, 1);
        assert_eq!(node.weight, 3);
    }

    #[test]
    fn test_node_entry_keyed_fields() {
        let node = parse_node_entry("n1@h:1,weight=5,type=optical").unwrap();
        assert_eq!(node.node_type, NodeType::Optical);
        assert_eq!(node.weight, 5);
    }

    #[test]
    fn test_mds_config_rejects_duplicate_nodes() {
        let pairs = parse_kv_str("MDS_DB_PATH=/tmp/db\nNODES=n1@h:1;n1@h:2\n").unwrap();
        assert!(MdsConfig::from_pairs(&pairs).is_err());
    }

    #[test]
    fn test_archive_target_clamped_to_trigger() {
        let pairs = parse_kv_str(
            "MDS_DB_PATH=/tmp/db\nNODES=n1@h:1\n\
             ARCHIVE_TRIGGER_BYTES=100\nARCHIVE_TARGET_BYTES=200\n",
        )
        .unwrap();
        let cfg = MdsConfig::from_pairs(&pairs).unwrap();
        assert_eq!(cfg.archive_target_bytes, cfg.archive_trigger_bytes);
    }
}
