use log::debug;
use petgraph::{
    algo::has_path_connecting,
    graph::{DiGraph, NodeIndex},
    Direction::{self, Incoming},
};

use crate::{
    distributions::{bernoulli::Bernoulli, distribution_trait::Distribution},
    error::Result,
    factor_types::{
        factor_type::FactorType, random_factor::RandomFactor, uses_equal_def::UsesEqualDefFactor,
    },
};

// Configuration of one model instance: the prior of the variable and the number of its use sites
#[derive(Debug, Clone, PartialEq)]
pub struct Model<D: Distribution> {
    prior: D,
    num_uses: usize,
}

impl<D: Distribution> Model<D> {
    pub fn new(prior: D, num_uses: usize) -> Self {
        Model { prior, num_uses }
    }

    pub fn prior(&self) -> &D {
        &self.prior
    }

    pub fn num_uses(&self) -> usize {
        self.num_uses
    }
}

impl Model<Bernoulli> {
    // Creates a model with a Bernoulli prior, checking that the prior probability lies in [0, 1]
    pub fn bernoulli(prior_prob_true: f64, num_uses: usize) -> Result<Self> {
        Ok(Model::new(Bernoulli::new(prior_prob_true)?, num_uses))
    }
}

// Nodes of the model graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode<D: Distribution> {
    Variable,
    Factor(FactorType<D>),
    UseSite(usize), // an external reference to the variable, writes one use message
}

// Edges point from the node producing a message to the node consuming it
pub type ModelGraph<D> = DiGraph<GraphNode<D>, (), usize>;

// Stores the star-shaped factor graph around one variable:
// the prior feeds the variable, and the variable and every use site feed the combining factor
pub struct FactorGraph<D: Distribution> {
    graph: ModelGraph<D>,
    variable: NodeIndex<usize>,
}

impl<D: Distribution> FactorGraph<D> {
    pub fn new(model: &Model<D>) -> Self {
        let mut graph = ModelGraph::with_capacity(model.num_uses() + 3, model.num_uses() + 2);

        let variable = graph.add_node(GraphNode::Variable);
        let random = graph.add_node(GraphNode::Factor(
            RandomFactor::new(model.prior().clone()).into(),
        ));
        let uses_equal_def = graph.add_node(GraphNode::Factor(
            UsesEqualDefFactor::new(model.num_uses()).into(),
        ));

        graph.add_edge(random, variable, ());
        graph.add_edge(variable, uses_equal_def, ());
        for index in 0..model.num_uses() {
            let use_site = graph.add_node(GraphNode::UseSite(index));
            graph.add_edge(use_site, uses_equal_def, ());
        }

        debug!(
            "Constructed factor graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        FactorGraph { graph, variable }
    }

    pub fn graph(&self) -> &ModelGraph<D> {
        &self.graph
    }

    pub fn variable(&self) -> NodeIndex<usize> {
        self.variable
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    // Returns the factor stored at the given node, if the node is a factor
    pub fn factor(&self, node: NodeIndex<usize>) -> Option<&FactorType<D>> {
        match self.graph.node_weight(node) {
            Some(GraphNode::Factor(factor)) => Some(factor),
            _ => None,
        }
    }

    pub fn is_factor(&self, node: NodeIndex<usize>) -> bool {
        self.factor(node).is_some()
    }

    pub fn has_edges(&self, node: NodeIndex<usize>, direction: Direction) -> bool {
        self.graph
            .neighbors_directed(node, direction)
            .next()
            .is_some()
    }

    // Checks if all inputs of a node are fixed once the model is configured
    pub fn is_constant(&self, node: NodeIndex<usize>) -> bool {
        !self.has_edges(node, Incoming)
    }

    // Checks if any use site can reach the given node, i.e., if its inputs can change between updates
    pub fn depends_on_use_sites(&self, node: NodeIndex<usize>) -> bool {
        self.graph.node_indices().any(|source| {
            matches!(self.graph[source], GraphNode::UseSite(_))
                && has_path_connecting(&self.graph, source, node, None)
        })
    }
}
