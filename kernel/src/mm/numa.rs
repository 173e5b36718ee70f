//! NUMA node table.
//!
//! Built once at boot from the firmware memory map. Mirrors
//! `numa_init`/`numa_node_region` from the original C kernel: usable regions
//! become nodes; if the firmware reports none, the whole of the first usable
//! region (or all of RAM, if even that is absent) becomes a single node.

use spin::Mutex;

use super::MemoryRegion;

/// Upper bound on the number of NUMA nodes the buddy allocator indexes.
pub const MAX_NUMA_NODES: usize = 8;

/// `{base, length}` — see `spec.md` §3's NUMA node definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumaNode {
    pub base: u64,
    pub length: u64,
}

struct NumaTable {
    nodes: [NumaNode; MAX_NUMA_NODES],
    count: usize,
}

static NUMA_TABLE: Mutex<NumaTable> = Mutex::new(NumaTable {
    nodes: [NumaNode { base: 0, length: 0 }; MAX_NUMA_NODES],
    count: 0,
});

/// Populate the NUMA table from the firmware memory map.
///
/// Zero usable regions degenerate to a single node spanning the first
/// region in the map (usable or not), matching the original kernel's
/// fallback exactly.
pub fn init(regions: &[MemoryRegion]) {
    let mut table = NUMA_TABLE.lock();
    table.count = 0;

    for region in regions {
        if !region.usable {
            continue;
        }
        if table.count >= MAX_NUMA_NODES {
            break;
        }
        table.nodes[table.count] = NumaNode {
            base: region.start,
            length: region.size,
        };
        table.count += 1;
    }

    if table.count == 0 {
        if let Some(first) = regions.first() {
            table.nodes[0] = NumaNode {
                base: first.start,
                length: first.size,
            };
            table.count = 1;
        }
    }

    log::info!("[NUMA] {} node(s) registered", table.count);
}

/// Number of NUMA nodes currently registered.
pub fn node_count() -> usize {
    NUMA_TABLE.lock().count
}

/// The `{base, length}` region owned by a given node index, if any.
pub fn node_region(node: usize) -> Option<NumaNode> {
    let table = NUMA_TABLE.lock();
    if node < table.count {
        Some(table.nodes[node])
    } else {
        None
    }
}

/// Which node, if any, contains the given physical address.
pub fn node_for_address(addr: u64) -> Option<usize> {
    let table = NUMA_TABLE.lock();
    (0..table.count).find(|&i| {
        let n = table.nodes[i];
        addr >= n.base && addr < n.base + n.length
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_single_node() {
        let regions = [MemoryRegion {
            start: 0,
            size: 0x1000_0000,
            usable: false,
        }];
        init(&regions);
        assert_eq!(node_count(), 1);
        assert_eq!(node_region(0).unwrap().length, 0x1000_0000);
    }

    #[test]
    fn usable_regions_become_nodes() {
        let regions = [
            MemoryRegion {
                start: 0,
                size: 0x1000,
                usable: true,
            },
            MemoryRegion {
                start: 0x10000,
                size: 0x2000,
                usable: true,
            },
        ];
        init(&regions);
        assert_eq!(node_count(), 2);
        assert_eq!(node_region(1).unwrap().base, 0x10000);
    }
}
