//! Refreshable cache of allocatable primaries with weighted round-robin
//! selection.
//!
//! The selector keeps a `(cursor, repeat_remaining)` pair instead of building
//! a hash ring: each time `repeat_remaining` reaches zero the cursor advances
//! and is recharged with the next allocatable node's weight. Selection
//! suppresses duplicate logical node ids until the estimated unique count is
//! reached, then allows repeats to fill the request. Virtual nodes expand
//! into `<base>-v<i>` logical slots with a shifted disk pick per slot.

use crate::types::{Epoch, NodeType};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct DiskInfo {
    pub disk_id: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub is_healthy: bool,
}

/// One allocatable primary (plus its cached secondary pairing) as seen by
/// the MDS.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: String,
    pub address: String,
    pub group_id: String,
    pub node_type: NodeType,
    pub weight: u32,
    pub virtual_node_count: u32,
    pub next_virtual_index: u64,
    pub allocatable: bool,
    pub is_primary: bool,
    pub sync_ready: bool,
    pub epoch: Epoch,
    pub secondary_node_id: String,
    pub secondary_address: String,
    pub disks: Vec<DiskInfo>,
    pub next_disk_index: usize,
}

impl NodeInfo {
    pub fn new(node_id: impl Into<String>, address: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            group_id: node_id.clone(),
            node_id,
            address: address.into(),
            node_type: NodeType::Real,
            weight: 1,
            virtual_node_count: 1,
            next_virtual_index: 0,
            allocatable: true,
            is_primary: true,
            sync_ready: false,
            epoch: 1,
            secondary_node_id: String::new(),
            secondary_address: String::new(),
            disks: Vec::new(),
            next_disk_index: 0,
        }
    }
}

/// The outcome of one selector step: a logical node slot plus a disk.
#[derive(Debug, Clone)]
pub struct NodeSelection {
    pub node_id: String,
    pub address: String,
    pub node_type: NodeType,
    pub disk_id: String,
    pub group_id: String,
    pub epoch: Epoch,
    pub secondary_node_id: String,
    pub secondary_address: String,
    pub sync_ready: bool,
}

struct CacheInner {
    nodes: Vec<NodeInfo>,
    cursor: usize,
    repeat_remaining: u32,
}

pub struct NodeStateCache {
    inner: Mutex<CacheInner>,
}

impl NodeStateCache {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self {
            inner: Mutex::new(CacheInner { nodes, cursor: 0, repeat_remaining: 0 }),
        }
    }

    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.inner.lock().nodes.clone()
    }

    /// Swap in a fresh node vector; selector state restarts.
    pub fn replace_nodes(&self, nodes: Vec<NodeInfo>) {
        let mut inner = self.inner.lock();
        inner.nodes = nodes;
        inner.cursor = 0;
        inner.repeat_remaining = 0;
    }

    /// Pick up to `count` selections.
    ///
    /// With `strict` the filter keeps only nodes of `type_filter`; without it
    /// the filter excludes that type (the allocator excludes optical this
    /// way). Duplicate logical ids are suppressed until the estimated unique
    /// count is reached, then repeats fill the remainder.
    pub fn pick_nodes(&self, count: u32, type_filter: NodeType, strict: bool) -> Vec<NodeSelection> {
        let mut inner = self.inner.lock();
        let mut picked = Vec::new();
        if inner.nodes.is_empty() || count == 0 {
            return picked;
        }

        let unique_target =
            (count as usize).min(estimate_logical_count(&inner.nodes, type_filter, strict));
        let weight_sum = estimate_weight_sum(&inner.nodes, type_filter, strict);
        let max_attempts = (unique_target * weight_sum * 2).clamp(64, 1_000_000);

        let mut selected: HashSet<String> = HashSet::new();
        let mut attempts = 0;
        while attempts < max_attempts && picked.len() < unique_target {
            attempts += 1;
            let Some(selection) = next_selection(&mut inner, type_filter, strict) else {
                break;
            };
            if selected.insert(selection.node_id.clone()) {
                picked.push(selection);
            }
        }

        while picked.len() < count as usize {
            let Some(selection) = next_selection(&mut inner, type_filter, strict) else {
                break;
            };
            picked.push(selection);
        }

        picked
    }
}

fn is_allocatable(node: &NodeInfo, type_filter: NodeType, strict: bool) -> bool {
    if !node.allocatable || !node.is_primary {
        return false;
    }
    if strict {
        node.node_type == type_filter
    } else {
        node.node_type != type_filter
    }
}

fn estimate_logical_count(nodes: &[NodeInfo], type_filter: NodeType, strict: bool) -> usize {
    nodes
        .iter()
        .filter(|n| is_allocatable(n, type_filter, strict))
        .map(|n| {
            if n.node_type == NodeType::Virtual {
                n.virtual_node_count.max(1) as usize
            } else {
                1
            }
        })
        .sum()
}

fn estimate_weight_sum(nodes: &[NodeInfo], type_filter: NodeType, strict: bool) -> usize {
    nodes
        .iter()
        .filter(|n| is_allocatable(n, type_filter, strict))
        .map(|n| n.weight.max(1) as usize)
        .sum::<usize>()
        .max(1)
}

/// Advance the weighted round-robin by one selection.
fn next_selection(
    inner: &mut CacheInner,
    type_filter: NodeType,
    strict: bool,
) -> Option<NodeSelection> {
    let node_count = inner.nodes.len();
    if node_count == 0 {
        return None;
    }

    let mut scanned = 0;
    let node_index = loop {
        if scanned >= node_count {
            return None;
        }
        let index = inner.cursor % node_count;
        if is_allocatable(&inner.nodes[index], type_filter, strict) {
            break index;
        }
        inner.cursor = (inner.cursor + 1) % node_count;
        inner.repeat_remaining = 0;
        scanned += 1;
    };

    if inner.repeat_remaining == 0 {
        inner.repeat_remaining = inner.nodes[node_index].weight.max(1);
    }

    let node = &mut inner.nodes[node_index];
    let mut virtual_index = 0;
    let node_id = if node.node_type == NodeType::Virtual {
        let total = node.virtual_node_count.max(1) as u64;
        virtual_index = node.next_virtual_index % total;
        node.next_virtual_index = (node.next_virtual_index + 1) % total;
        format!("{}-v{}", node.node_id, virtual_index)
    } else {
        node.node_id.clone()
    };
    let disk_id = pick_disk(node, virtual_index);

    let selection = NodeSelection {
        node_id,
        address: node.address.clone(),
        node_type: node.node_type,
        disk_id,
        group_id: if node.group_id.is_empty() {
            node.node_id.clone()
        } else {
            node.group_id.clone()
        },
        epoch: node.epoch,
        secondary_node_id: node.secondary_node_id.clone(),
        secondary_address: node.secondary_address.clone(),
        sync_ready: node.sync_ready,
    };

    inner.repeat_remaining -= 1;
    if inner.repeat_remaining == 0 {
        inner.cursor = (inner.cursor + 1) % node_count;
    }

    Some(selection)
}

/// Round-robin over the node's disks, shifted by the virtual slot so that
/// each logical slot starts on a different disk.
fn pick_disk(node: &mut NodeInfo, virtual_index: u64) -> String {
    if node.disks.is_empty() {
        return "disk-01".to_string();
    }
    let disk_count = node.disks.len();
    let base = node.next_disk_index % disk_count;
    let shift = (virtual_index as usize) % disk_count;
    node.next_disk_index = (node.next_disk_index + 1) % disk_count;
    node.disks[(base + shift) % disk_count].disk_id.clone()
}
