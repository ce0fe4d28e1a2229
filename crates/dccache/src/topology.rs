#![forbid(unsafe_code)]

//! Trigger dependency graph.
//!
//! Nodes exist while at least one dependency row references them. A
//! trigger is ranked after every trigger it depends on so that masters are
//! evaluated first.

use crate::domain::{Trigger, TriggerValue};
use crate::stores::Table;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error, warn};

/// Deepest dependency chain followed when checking dependencies.
pub const MAX_DEPENDENCY_LEVEL: usize = 32;

/// Rank given to triggers whose chain is longer than the ranks can express.
pub const MAX_TOPOINDEX: u8 = u8::MAX;

#[derive(Debug, Default)]
struct DependencyNode {
    /// Triggers this trigger depends on, with the number of rows linking
    /// them.
    masters: BTreeMap<u64, u32>,
    dependents: BTreeMap<u64, u32>,
    refcount: u32,
}

/// Outcome of checking the masters of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// No master is in problem state.
    Ok,
    /// A master is in problem state; the dependent must not fire.
    Fail,
    /// A master is being evaluated right now; retry after it settles.
    Unresolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyReport {
    /// Triggers whose rank changed.
    pub updated: usize,
    /// One `(dependent, master)` pair per dependency closing a cycle.
    pub cycles: Vec<(u64, u64)>,
}

#[derive(Debug, Default)]
pub struct Topology {
    nodes: HashMap<u64, DependencyNode>,
    /// Dependency rows by id: `(dependent, master)`.
    links: HashMap<u64, (u64, u64)>,
}

enum Mark {
    InProgress,
    Done(u8),
}

impl Topology {
    /// Apply a dependency row. Returns `false` when it is already known.
    pub fn add_link(&mut self, linkid: u64, down: u64, up: u64) -> bool {
        match self.links.get(&linkid) {
            Some(&link) if link == (down, up) => return false,
            Some(_) => {
                self.remove_link(linkid);
            }
            None => {}
        }
        self.links.insert(linkid, (down, up));

        let node = self.nodes.entry(down).or_default();
        *node.masters.entry(up).or_default() += 1;
        node.refcount += 1;
        let node = self.nodes.entry(up).or_default();
        *node.dependents.entry(down).or_default() += 1;
        node.refcount += 1;
        true
    }

    pub fn remove_link(&mut self, linkid: u64) -> bool {
        let Some((down, up)) = self.links.remove(&linkid) else {
            return false;
        };
        self.unref(down, |node| &mut node.masters, up);
        self.unref(up, |node| &mut node.dependents, down);
        true
    }

    fn unref(
        &mut self,
        id: u64,
        edges: impl Fn(&mut DependencyNode) -> &mut BTreeMap<u64, u32>,
        other: u64,
    ) {
        let Some(node) = self.nodes.get_mut(&id) else {
            error!(triggerid = id, "dependency node missing for existing link");
            return;
        };
        let map = edges(node);
        if let Some(count) = map.get_mut(&other) {
            *count -= 1;
            if *count == 0 {
                map.remove(&other);
            }
        }
        node.refcount -= 1;
        if node.refcount == 0 {
            self.nodes.remove(&id);
        }
    }

    /// Triggers `triggerid` depends on, ordered and deduplicated.
    pub fn masters(&self, triggerid: u64) -> Vec<u64> {
        self.nodes
            .get(&triggerid)
            .map(|node| node.masters.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn dependents(&self, triggerid: u64) -> Vec<u64> {
        self.nodes
            .get(&triggerid)
            .map(|node| node.dependents.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Dependency row by id as `(dependent, master)`.
    pub fn link(&self, linkid: u64) -> Option<(u64, u64)> {
        self.links.get(&linkid).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Check whether any master of `triggerid` prevents it from changing
    /// state. Masters listed in `in_flight` are being evaluated by the
    /// caller and resolve to [`DependencyStatus::Unresolved`].
    pub fn check_dependencies(
        &self,
        triggers: &Table<Trigger>,
        triggerid: u64,
        in_flight: &HashSet<u64>,
    ) -> DependencyStatus {
        let mut visited = HashSet::from([triggerid]);
        self.check_level(triggers, triggerid, in_flight, &mut visited, 0)
    }

    fn check_level(
        &self,
        triggers: &Table<Trigger>,
        triggerid: u64,
        in_flight: &HashSet<u64>,
        visited: &mut HashSet<u64>,
        level: usize,
    ) -> DependencyStatus {
        if level > MAX_DEPENDENCY_LEVEL {
            warn!(triggerid, "trigger dependency chain is too deep");
            return DependencyStatus::Ok;
        }
        let Some(node) = self.nodes.get(&triggerid) else {
            return DependencyStatus::Ok;
        };

        let mut status = DependencyStatus::Ok;
        for &master in node.masters.keys() {
            if !visited.insert(master) {
                continue;
            }
            let Some(trigger) = triggers.get(master) else {
                continue;
            };
            if !trigger.is_enabled() || !trigger.functional {
                continue;
            }
            if in_flight.contains(&master) {
                status = DependencyStatus::Unresolved;
                continue;
            }
            if trigger.value == TriggerValue::Problem {
                return DependencyStatus::Fail;
            }
            match self.check_level(triggers, master, in_flight, visited, level + 1) {
                DependencyStatus::Fail => return DependencyStatus::Fail,
                DependencyStatus::Unresolved => status = DependencyStatus::Unresolved,
                DependencyStatus::Ok => {}
            }
        }
        status
    }

    /// Recompute the rank of every trigger.
    ///
    /// Triggers without masters get rank 1; a dependent is ranked one above
    /// its highest ranked master. Each dependency closing a cycle is
    /// reported once and every trigger on that cycle gets `MAX_TOPOINDEX`.
    pub fn sort_topologically(&self, triggers: &mut Table<Trigger>) -> TopologyReport {
        let mut report = TopologyReport::default();
        let mut marks: HashMap<u64, Mark> = HashMap::new();
        let mut capped: HashSet<u64> = HashSet::new();

        for start in triggers.sorted_ids() {
            if marks.contains_key(&start) {
                continue;
            }
            marks.insert(start, Mark::InProgress);
            let mut stack = vec![(start, self.masters(start), 0usize)];

            while let Some((id, masters, next)) = stack.last_mut() {
                if let Some(&master) = masters.get(*next) {
                    *next += 1;
                    let id = *id;
                    if !triggers.contains(master) {
                        continue;
                    }
                    match marks.get(&master) {
                        None => {
                            marks.insert(master, Mark::InProgress);
                            let masters = self.masters(master);
                            stack.push((master, masters, 0));
                        }
                        Some(Mark::InProgress) => {
                            error!(triggerid = id, master, "trigger dependency cycle detected");
                            report.cycles.push((id, master));
                            let from = stack
                                .iter()
                                .rposition(|(member, ..)| *member == master)
                                .unwrap_or(0);
                            capped.extend(stack[from..].iter().map(|(member, ..)| *member));
                        }
                        Some(Mark::Done(_)) => {}
                    }
                    continue;
                }

                let id = *id;
                let rank = if capped.contains(&id) {
                    MAX_TOPOINDEX
                } else {
                    masters
                        .iter()
                        .filter_map(|master| match marks.get(master) {
                            Some(Mark::Done(rank)) => Some(*rank),
                            _ => None,
                        })
                        .max()
                        .map_or(1, |rank| rank.saturating_add(1).min(MAX_TOPOINDEX))
                };
                marks.insert(id, Mark::Done(rank));
                stack.pop();

                if let Some(trigger) = triggers.get_mut(id)
                    && trigger.topoindex != rank
                {
                    trigger.topoindex = rank;
                    report.updated += 1;
                }
            }
        }

        debug!(
            updated = report.updated,
            cycles = report.cycles.len(),
            "trigger topology sorted"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use pretty_assertions::assert_eq;

    fn triggers(ids: &[u64]) -> Table<Trigger> {
        let mut table = Table::new(Arena::new("records", 1 << 20));
        for &id in ids {
            table.insert_with(id, || Trigger::new(id)).unwrap();
        }
        table
    }

    fn rank(table: &Table<Trigger>, id: u64) -> u8 {
        table.get(id).unwrap().topoindex
    }

    #[test]
    fn dependents_rank_after_masters() {
        let mut table = triggers(&[1, 2, 3, 4]);
        let mut topology = Topology::default();
        topology.add_link(10, 2, 1);
        topology.add_link(11, 3, 2);
        topology.add_link(12, 3, 1);

        let report = topology.sort_topologically(&mut table);
        assert!(report.cycles.is_empty());
        assert_eq!(rank(&table, 1), 1);
        assert_eq!(rank(&table, 2), 2);
        assert_eq!(rank(&table, 3), 3);
        assert_eq!(rank(&table, 4), 1);
    }

    #[test]
    fn duplicate_rows_keep_one_dependency() {
        let mut topology = Topology::default();
        topology.add_link(1, 2, 1);
        topology.add_link(2, 2, 1);
        assert_eq!(topology.masters(2), vec![1]);
        topology.remove_link(1);
        assert_eq!(topology.masters(2), vec![1]);
        topology.remove_link(2);
        assert!(topology.masters(2).is_empty());
        assert_eq!(topology.node_count(), 0);
    }

    #[test]
    fn cycle_is_reported_once() {
        let mut table = triggers(&[1, 2, 3]);
        let mut topology = Topology::default();
        topology.add_link(1, 1, 2);
        topology.add_link(2, 2, 3);
        topology.add_link(3, 3, 1);

        let report = topology.sort_topologically(&mut table);
        assert_eq!(report.cycles.len(), 1);
        for id in [1, 2, 3] {
            assert_eq!(rank(&table, id), MAX_TOPOINDEX);
        }
    }

    #[test]
    fn dependents_of_a_cycle_rank_after_it() {
        let mut table = triggers(&[1, 2, 3, 4]);
        let mut topology = Topology::default();
        topology.add_link(1, 1, 2);
        topology.add_link(2, 2, 1);
        topology.add_link(3, 3, 2);

        let report = topology.sort_topologically(&mut table);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(rank(&table, 1), MAX_TOPOINDEX);
        assert_eq!(rank(&table, 2), MAX_TOPOINDEX);
        assert_eq!(rank(&table, 3), MAX_TOPOINDEX);
        assert_eq!(rank(&table, 4), 1);
    }

    #[test]
    fn problem_master_blocks_dependent() {
        let mut table = triggers(&[1, 2, 3]);
        let mut topology = Topology::default();
        topology.add_link(1, 3, 2);
        topology.add_link(2, 2, 1);
        let none = HashSet::new();

        assert_eq!(topology.check_dependencies(&table, 3, &none), DependencyStatus::Ok);
        table.get_mut(1).unwrap().value = TriggerValue::Problem;
        assert_eq!(topology.check_dependencies(&table, 3, &none), DependencyStatus::Fail);
        table.get_mut(1).unwrap().value = TriggerValue::Ok;
        assert_eq!(
            topology.check_dependencies(&table, 3, &HashSet::from([1])),
            DependencyStatus::Unresolved
        );
    }

    #[test]
    fn cyclic_dependencies_terminate() {
        let table = triggers(&[1, 2]);
        let mut topology = Topology::default();
        topology.add_link(1, 1, 2);
        topology.add_link(2, 2, 1);
        assert_eq!(
            topology.check_dependencies(&table, 1, &HashSet::new()),
            DependencyStatus::Ok
        );
    }
}
