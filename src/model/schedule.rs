use std::slice::Iter;

use log::debug;
use petgraph::{graph::NodeIndex, visit::Topo};

use crate::distributions::distribution_trait::Distribution;

use super::factor_graph::FactorGraph;

// Stores the order in which factors send messages, split by the phase of the inference lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    reset: Vec<NodeIndex<usize>>,      // factors whose messages depend only on constants
    initialise: Vec<NodeIndex<usize>>, // factors run once when inference starts
    iteration: Vec<NodeIndex<usize>>,  // factors re-run by every update
}

impl Schedule {
    // Creates a schedule for the given factor graph, visiting factors in topological order.
    // Factors without inputs run on reset, every other factor runs on initialise,
    // and factors fed by use sites are also repeated on every update.
    pub fn new<D: Distribution>(factor_graph: &FactorGraph<D>) -> Self {
        let graph = factor_graph.graph();
        let mut schedule = Schedule {
            reset: Vec::new(),
            initialise: Vec::new(),
            iteration: Vec::new(),
        };

        let mut topo = Topo::new(graph);
        while let Some(node) = topo.next(graph) {
            if !factor_graph.is_factor(node) {
                continue;
            }
            if factor_graph.is_constant(node) {
                schedule.reset.push(node);
                continue;
            }
            schedule.initialise.push(node);
            if factor_graph.depends_on_use_sites(node) {
                schedule.iteration.push(node);
            }
        }

        debug!(
            "Schedule: {} reset, {} initialise, {} iteration steps",
            schedule.reset.len(),
            schedule.initialise.len(),
            schedule.iteration.len()
        );
        schedule
    }

    pub fn reset_iter(&self) -> Iter<NodeIndex<usize>> {
        self.reset.iter()
    }

    pub fn initialise_iter(&self) -> Iter<NodeIndex<usize>> {
        self.initialise.iter()
    }

    pub fn iteration_iter(&self) -> Iter<NodeIndex<usize>> {
        self.iteration.iter()
    }

    // Checks if the schedule reaches its fixed point in the initialise phase,
    // in which case updates have nothing to do
    pub fn converges_without_iteration(&self) -> bool {
        self.iteration.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        distributions::bernoulli::Bernoulli,
        factor_types::factor_trait::Factor,
        model::factor_graph::{FactorGraph, Model},
    };

    use super::*;

    fn names<'a>(
        factor_graph: &'a FactorGraph<Bernoulli>,
        steps: Iter<NodeIndex<usize>>,
    ) -> Vec<&'a str> {
        steps
            .filter_map(|node| factor_graph.factor(*node))
            .map(|factor| factor.name())
            .collect()
    }

    #[test]
    fn without_uses() {
        let factor_graph = FactorGraph::new(&Model::bernoulli(0.01, 0).unwrap());
        let schedule = Schedule::new(&factor_graph);

        assert_eq!(names(&factor_graph, schedule.reset_iter()), vec!["Random"]);
        assert_eq!(
            names(&factor_graph, schedule.initialise_iter()),
            vec!["UsesEqualDef"]
        );
        assert!(schedule.iteration_iter().next().is_none());
        assert!(schedule.converges_without_iteration());
    }

    #[test]
    fn with_uses() {
        let factor_graph = FactorGraph::new(&Model::bernoulli(0.01, 2).unwrap());
        let schedule = Schedule::new(&factor_graph);

        assert_eq!(names(&factor_graph, schedule.reset_iter()), vec!["Random"]);
        assert_eq!(
            names(&factor_graph, schedule.initialise_iter()),
            vec!["UsesEqualDef"]
        );
        assert_eq!(
            names(&factor_graph, schedule.iteration_iter()),
            vec!["UsesEqualDef"]
        );
        assert!(!schedule.converges_without_iteration());
    }

    #[test]
    fn every_factor_is_scheduled_once() {
        for num_uses in [0, 1, 5] {
            let factor_graph = FactorGraph::new(&Model::bernoulli(0.3, num_uses).unwrap());
            let schedule = Schedule::new(&factor_graph);

            let mut scheduled: Vec<NodeIndex<usize>> = schedule
                .reset_iter()
                .chain(schedule.initialise_iter())
                .copied()
                .collect();
            scheduled.sort();
            let factors: Vec<NodeIndex<usize>> = factor_graph
                .graph()
                .node_indices()
                .filter(|node| factor_graph.is_factor(*node))
                .collect();
            assert_eq!(scheduled, factors);
        }
    }
}
