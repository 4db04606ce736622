//! Clique trees and exact sum-product calibration.

use crate::{Error, Factor, Result, VariableSet};
use std::io::{BufRead, Write};

struct Clique {
    vars: VariableSet,
    neighbours: Vec<usize>,
    /// Potential attached before calibration; EM re-reads it every pass, so
    /// calibration must never overwrite or alias it.
    initial: Factor,
    /// Belief from the most recent calibration.
    calibrated: Factor,
}

/// A tree of cliques over discrete variables.
///
/// Every node carries a variable set and a potential; adjacent cliques
/// communicate through their separator (the intersection of their variable
/// sets). Construction checks that the adjacency really is a tree and that
/// the running-intersection property holds: a variable shared by two cliques
/// appears in every clique on the path between them.
///
/// [`calibrate`](CliqueTree::calibrate) runs exact sum-product message
/// passing, after which [`calibrated`](CliqueTree::calibrated) beliefs are
/// the unnormalised marginals of the joint distribution defined by the
/// potentials.
pub struct CliqueTree {
    nodes: Vec<Clique>,
    card: Vec<usize>,
}

impl CliqueTree {
    /// Builds a tree from clique scopes and symmetric adjacency lists, with
    /// uniform initial potentials.
    ///
    /// `card` is the global cardinality vector covering every variable that
    /// appears in a clique. Fails with [`Error::StructureViolation`] if the
    /// adjacency is not a connected acyclic symmetric graph or the
    /// running-intersection property fails.
    pub fn new(
        cliques: Vec<VariableSet>,
        neighbours: Vec<Vec<usize>>,
        card: &[usize],
    ) -> Result<CliqueTree> {
        if cliques.is_empty() {
            return Err(Error::StructureViolation(
                "a clique tree needs at least one clique".into(),
            ));
        }
        if cliques.len() != neighbours.len() {
            return Err(Error::StructureViolation(format!(
                "{} cliques but {} adjacency lists",
                cliques.len(),
                neighbours.len()
            )));
        }
        let n = cliques.len();
        let mut half_edges = 0;
        for (i, ns) in neighbours.iter().enumerate() {
            for &j in ns {
                if j >= n || j == i {
                    return Err(Error::StructureViolation(format!(
                        "clique {i} lists invalid neighbour {j}"
                    )));
                }
                if !neighbours[j].contains(&i) {
                    return Err(Error::StructureViolation(format!(
                        "adjacency is not symmetric between {i} and {j}"
                    )));
                }
                if ns.iter().filter(|&&k| k == j).count() > 1 {
                    return Err(Error::StructureViolation(format!(
                        "clique {i} lists neighbour {j} twice"
                    )));
                }
                half_edges += 1;
            }
        }
        if half_edges != 2 * (n - 1) {
            return Err(Error::StructureViolation(format!(
                "{} edges for {} cliques; a tree has exactly {}",
                half_edges / 2,
                n,
                n - 1
            )));
        }
        let reached = reachable_from(0, n, |i| neighbours[i].iter().copied());
        if reached < n {
            return Err(Error::StructureViolation(
                "the clique graph is not connected".into(),
            ));
        }
        for (i, vars) in cliques.iter().enumerate() {
            if let Some(v) = vars.iter().find(|&v| v >= card.len()) {
                return Err(Error::StructureViolation(format!(
                    "clique {i} mentions variable {v} beyond the cardinality vector"
                )));
            }
        }
        // running intersection: the cliques containing any one variable must
        // induce a connected subgraph
        let scope = cliques
            .iter()
            .fold(VariableSet::empty(), |acc, c| acc.union(c));
        for v in scope.iter() {
            let members: Vec<usize> = (0..n).filter(|&i| cliques[i].contains(v)).collect();
            let reached = reachable_from(members[0], n, |i| {
                neighbours[i]
                    .iter()
                    .copied()
                    .filter(|&j| cliques[j].contains(v))
            });
            if reached < members.len() {
                return Err(Error::StructureViolation(format!(
                    "variable {v} does not induce a connected subtree"
                )));
            }
        }

        let nodes = cliques
            .into_iter()
            .zip(neighbours)
            .map(|(vars, neighbours)| {
                let potential = Factor::uniform(vars.clone(), card);
                Clique {
                    vars,
                    neighbours,
                    calibrated: potential.clone(),
                    initial: potential,
                }
            })
            .collect();
        Ok(CliqueTree {
            nodes,
            card: card.to_vec(),
        })
    }

    /// Number of cliques.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: construction rejects empty trees.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The variable set of clique `i`.
    pub fn vars(&self, i: usize) -> &VariableSet {
        &self.nodes[i].vars
    }

    /// Scopes of all cliques, in index order.
    pub fn cliques(&self) -> impl Iterator<Item = &VariableSet> {
        self.nodes.iter().map(|n| &n.vars)
    }

    /// Adjacent clique indices of clique `i`.
    pub fn neighbours(&self, i: usize) -> &[usize] {
        &self.nodes[i].neighbours
    }

    /// The global cardinality vector the tree was built with.
    pub fn cardinalities(&self) -> &[usize] {
        &self.card
    }

    /// The initial potential of clique `i`.
    pub fn initial(&self, i: usize) -> &Factor {
        &self.nodes[i].initial
    }

    /// The belief of clique `i` from the most recent calibration (the initial
    /// potential if the tree has not been calibrated yet).
    pub fn calibrated(&self, i: usize) -> &Factor {
        &self.nodes[i].calibrated
    }

    /// The separator between two adjacent cliques.
    pub fn separator(&self, i: usize, j: usize) -> VariableSet {
        self.nodes[i].vars.intersection(&self.nodes[j].vars)
    }

    /// Every tree edge as an `(i, j)` pair with `i < j`.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::with_capacity(self.nodes.len().saturating_sub(1));
        for (i, node) in self.nodes.iter().enumerate() {
            for &j in &node.neighbours {
                if i < j {
                    edges.push((i, j));
                }
            }
        }
        edges
    }

    /// Separator variable sets, in [`edges`](CliqueTree::edges) order.
    pub fn separators(&self) -> Vec<VariableSet> {
        self.edges()
            .into_iter()
            .map(|(i, j)| self.separator(i, j))
            .collect()
    }

    /// Union of all clique scopes.
    pub fn scope(&self) -> VariableSet {
        self.nodes
            .iter()
            .fold(VariableSet::empty(), |acc, n| acc.union(&n.vars))
    }

    /// Replaces the potential of clique `i`. The scope must match.
    pub fn set_potential(&mut self, i: usize, potential: Factor) -> Result<()> {
        if potential.vars() != &self.nodes[i].vars {
            return Err(Error::ShapeMismatch(format!(
                "potential over {:?} for clique {i} over {:?}",
                potential.vars(),
                self.nodes[i].vars
            )));
        }
        self.nodes[i].calibrated = potential.clone();
        self.nodes[i].initial = potential;
        Ok(())
    }

    /// Replaces every potential at once, in clique order.
    pub fn set_all_potentials(&mut self, potentials: Vec<Factor>) -> Result<()> {
        if potentials.len() != self.nodes.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} potentials for {} cliques",
                potentials.len(),
                self.nodes.len()
            )));
        }
        for (i, potential) in potentials.into_iter().enumerate() {
            self.set_potential(i, potential)?;
        }
        Ok(())
    }

    /// Sum of a calibrated belief — the partition function of the joint
    /// distribution. Calibration makes this the same for every clique.
    pub fn partition(&self) -> f64 {
        self.nodes[0].calibrated.sum()
    }

    /// Calibrates every belief by iterative BFS message passing.
    ///
    /// Initial potentials are untouched; only the calibrated slots change.
    /// After this returns, for every edge the two endpoint beliefs agree on
    /// their separator marginal.
    pub fn calibrate(&mut self) {
        let potentials: Vec<&Factor> = self.nodes.iter().map(|n| &n.initial).collect();
        let betas = self.pass_messages(&potentials);
        self.store(betas);
    }

    /// Calibrates under evidence: each initial potential is restricted in a
    /// scratch copy (the originals stay put for the next EM pass), then the
    /// usual message passing runs on the restricted factors. Beliefs end up
    /// with the evidence dimensions collapsed.
    pub fn calibrate_with_evidence(&mut self, evidence: &[Option<usize>]) {
        let restricted: Vec<Factor> = self
            .nodes
            .iter()
            .map(|n| n.initial.restrict(evidence))
            .collect();
        let potentials: Vec<&Factor> = restricted.iter().collect();
        let betas = self.pass_messages(&potentials);
        self.store(betas);
    }

    /// Recursive up-down calibration. Agrees with
    /// [`calibrate`](CliqueTree::calibrate) to rounding; kept as the
    /// cross-check implementation (the BFS version is preferred because its
    /// stack does not grow with the tree depth).
    pub fn calibrate_recursive(&mut self) {
        let potentials: Vec<&Factor> = self.nodes.iter().map(|n| &n.initial).collect();
        let n = self.nodes.len();
        let mut send: Vec<Option<Factor>> = (0..n).map(|_| None).collect();
        let mut betas: Vec<Option<Factor>> = (0..n).map(|_| None).collect();

        let root = 0;
        let root_children = self.nodes[root].neighbours.clone();
        let mut messages = Vec::with_capacity(root_children.len());
        let mut prefix = vec![potentials[root].clone()];
        for &child in &root_children {
            let message = self.upward(&potentials, child, root, &mut send);
            let next = prefix
                .last()
                .expect("prefix starts non-empty")
                .product(&message);
            prefix.push(next);
            messages.push(message);
        }
        betas[root] = Some(prefix.last().expect("prefix starts non-empty").clone());
        self.distribute(&potentials, root, &prefix, &messages, None, &mut send, &mut betas);

        self.store(betas.into_iter().map(|b| b.expect("every clique visited")).collect());
    }

    /// Post-order message toward the root: the node's potential times every
    /// child message, with the non-separator variables summed out.
    fn upward(
        &self,
        potentials: &[&Factor],
        i: usize,
        parent: usize,
        send: &mut Vec<Option<Factor>>,
    ) -> Factor {
        let mut message = potentials[i].clone();
        let neighbours = self.nodes[i].neighbours.clone();
        for &ne in &neighbours {
            if ne != parent {
                let incoming = self.upward(potentials, ne, i, send);
                message = message.product(&incoming);
            }
        }
        let diff = self.nodes[i].vars.difference(&self.nodes[parent].vars);
        let message = message.sum_out_all(&diff);
        send[i] = Some(message.clone());
        message
    }

    /// Pre-order distribution from `v`: each child receives the product of
    /// the potential, its siblings' messages, and the parent message, summed
    /// out to the separator; then recurses.
    #[allow(clippy::too_many_arguments)]
    fn distribute(
        &self,
        potentials: &[&Factor],
        v: usize,
        prefix: &[Factor],
        messages: &[Factor],
        skip: Option<usize>,
        send: &mut Vec<Option<Factor>>,
        betas: &mut Vec<Option<Factor>>,
    ) {
        let neighbours = self.nodes[v].neighbours.clone();
        let count = neighbours.len();
        if count == 0 {
            return;
        }
        // suffix[k] multiplies the messages of neighbours after k
        let mut suffix: Vec<Option<Factor>> = (0..count).map(|_| None).collect();
        for k in (0..count - 1).rev() {
            suffix[k] = Some(match &suffix[k + 1] {
                Some(s) => s.product(&messages[k + 1]),
                None => messages[k + 1].clone(),
            });
        }
        for (k, &child) in neighbours.iter().enumerate() {
            if Some(child) == skip {
                continue;
            }
            let outgoing = match &suffix[k] {
                Some(s) => prefix[k].product(s),
                None => prefix[k].clone(),
            };
            let diff = self.nodes[v].vars.difference(&self.nodes[child].vars);
            let outgoing = outgoing.sum_out_all(&diff);

            // the child's belief and onward messages, with `outgoing`
            // standing in for its parent's entry
            let child_neighbours = self.nodes[child].neighbours.clone();
            let mut child_messages = Vec::with_capacity(child_neighbours.len());
            let mut child_prefix = vec![potentials[child].clone()];
            for &ne in &child_neighbours {
                let message = if ne == v {
                    outgoing.clone()
                } else {
                    send[ne].clone().expect("upward pass filled sibling messages")
                };
                let next = child_prefix
                    .last()
                    .expect("prefix starts non-empty")
                    .product(&message);
                child_prefix.push(next);
                child_messages.push(message);
            }
            betas[child] = Some(child_prefix.last().expect("prefix starts non-empty").clone());
            self.distribute(
                potentials,
                child,
                &child_prefix,
                &child_messages,
                Some(v),
                send,
                betas,
            );
        }
    }

    /// One full up-down pass over the tree rooted at clique 0, returning the
    /// calibrated beliefs. All working memory lives in this call.
    fn pass_messages(&self, potentials: &[&Factor]) -> Vec<Factor> {
        let n = self.nodes.len();
        let ctx = Rooting::new(self, 0);
        let mut send: Vec<Option<Factor>> = (0..n).map(|_| None).collect();
        let mut receive: Vec<Option<Factor>> = (0..n).map(|_| None).collect();
        let mut prefix: Vec<Vec<Factor>> = (0..n).map(|_| Vec::new()).collect();

        // upward: children appear after their parent in BFS order, so the
        // reverse order sees every child message before it is needed
        for &v in ctx.order.iter().rev() {
            let children = &ctx.children[v];
            let mut products = Vec::with_capacity(children.len() + 1);
            products.push(potentials[v].clone());
            for &child in children {
                let message = send[child]
                    .as_ref()
                    .expect("reverse BFS order computes child messages first");
                let next = products
                    .last()
                    .expect("prefix starts non-empty")
                    .product(message);
                products.push(next);
            }
            if let Some(parent) = ctx.parent[v] {
                let diff = self.nodes[v].vars.difference(&self.nodes[parent].vars);
                let joint = products.last().expect("prefix starts non-empty");
                send[v] = Some(joint.sum_out_all(&diff));
            }
            prefix[v] = products;
        }

        // downward: beliefs and child-bound messages via prefix/suffix
        // products, linear in the node degree
        let mut betas: Vec<Option<Factor>> = (0..n).map(|_| None).collect();
        for &v in &ctx.order {
            let joint = prefix[v].last().expect("prefix starts non-empty");
            let beta = match &receive[v] {
                Some(parent_message) => joint.product(parent_message),
                None => joint.clone(),
            };

            let children = &ctx.children[v];
            let count = children.len();
            if count > 0 {
                let mut suffix: Vec<Option<Factor>> = (0..count).map(|_| None).collect();
                suffix[count - 1] = receive[v].clone();
                for k in (0..count - 1).rev() {
                    let message = send[children[k + 1]]
                        .as_ref()
                        .expect("upward pass filled child messages");
                    suffix[k] = Some(match &suffix[k + 1] {
                        Some(s) => s.product(message),
                        None => message.clone(),
                    });
                }
                for (k, &child) in children.iter().enumerate() {
                    let outgoing = match &suffix[k] {
                        Some(s) => prefix[v][k].product(s),
                        None => prefix[v][k].clone(),
                    };
                    let diff = self.nodes[v].vars.difference(&self.nodes[child].vars);
                    receive[child] = Some(outgoing.sum_out_all(&diff));
                }
            }
            betas[v] = Some(beta);
        }

        betas
            .into_iter()
            .map(|b| b.expect("BFS order visits every clique"))
            .collect()
    }

    fn store(&mut self, betas: Vec<Factor>) {
        for (node, beta) in self.nodes.iter_mut().zip(betas) {
            node.calibrated = beta;
        }
    }

    /// Writes the tree — cliques, adjacency, cardinalities, and initial
    /// potentials — in a line-oriented text format that
    /// [`load`](CliqueTree::load) restores exactly (floats round-trip through
    /// their shortest decimal form).
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "cliquetree 1")?;
        writeln!(w, "{} {}", self.nodes.len(), self.card.len())?;
        writeln!(w, "{}", join(self.card.iter()))?;
        for node in &self.nodes {
            writeln!(w, "{}", join(node.vars.iter()))?;
            writeln!(w, "{}", join(node.neighbours.iter()))?;
            writeln!(w, "{}", join(node.initial.values().iter()))?;
        }
        Ok(())
    }

    /// Reads a tree written by [`save`](CliqueTree::save), revalidating the
    /// structure.
    pub fn load<R: BufRead>(r: &mut R) -> Result<CliqueTree> {
        let mut lines = r.lines();
        let mut next = move || -> Result<String> {
            lines
                .next()
                .ok_or_else(|| Error::InvalidData("truncated clique-tree file".into()))?
                .map_err(Error::from)
        };

        if next()?.trim() != "cliquetree 1" {
            return Err(Error::InvalidData(
                "not a clique-tree file (bad header)".into(),
            ));
        }
        let counts = parse_fields::<usize>(&next()?)?;
        let (n, num_vars) = match counts.as_slice() {
            [n, num_vars] => (*n, *num_vars),
            _ => {
                return Err(Error::InvalidData(
                    "expected clique and variable counts".into(),
                ))
            }
        };
        let card = parse_fields::<usize>(&next()?)?;
        if card.len() != num_vars {
            return Err(Error::InvalidData(format!(
                "{} cardinalities for {} variables",
                card.len(),
                num_vars
            )));
        }

        let mut cliques = Vec::with_capacity(n);
        let mut neighbours = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            cliques.push(VariableSet::new(&parse_fields::<usize>(&next()?)?));
            neighbours.push(parse_fields::<usize>(&next()?)?);
            values.push(parse_fields::<f64>(&next()?)?);
        }

        let mut tree = CliqueTree::new(cliques, neighbours, &card)?;
        for (i, table) in values.into_iter().enumerate() {
            let potential = Factor::from_values(tree.nodes[i].vars.clone(), &card, table)?;
            tree.set_potential(i, potential)?;
        }
        Ok(tree)
    }
}

/// BFS rooting of the tree: visit order plus parent/children views of the
/// undirected adjacency. Built fresh for every calibration call.
struct Rooting {
    order: Vec<usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
}

impl Rooting {
    fn new(tree: &CliqueTree, root: usize) -> Rooting {
        let n = tree.nodes.len();
        let mut parent = vec![None; n];
        let mut children: Vec<Vec<usize>> = (0..n).map(|_| Vec::new()).collect();
        let mut order = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        visited[root] = true;
        order.push(root);
        let mut at = 0;
        while at < order.len() {
            let v = order[at];
            at += 1;
            for &ne in &tree.nodes[v].neighbours {
                if !visited[ne] {
                    visited[ne] = true;
                    parent[ne] = Some(v);
                    children[v].push(ne);
                    order.push(ne);
                }
            }
        }
        Rooting {
            order,
            parent,
            children,
        }
    }
}

fn reachable_from<I, F>(start: usize, n: usize, mut neighbours: F) -> usize
where
    I: Iterator<Item = usize>,
    F: FnMut(usize) -> I,
{
    let mut visited = vec![false; n];
    let mut queue = vec![start];
    visited[start] = true;
    let mut reached = 0;
    while let Some(v) = queue.pop() {
        reached += 1;
        for ne in neighbours(v) {
            if !visited[ne] {
                visited[ne] = true;
                queue.push(ne);
            }
        }
    }
    reached
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    let mut out = String::new();
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&item.to_string());
    }
    out
}

fn parse_fields<T: std::str::FromStr>(line: &str) -> Result<Vec<T>> {
    line.split_whitespace()
        .map(|field| {
            field
                .parse()
                .map_err(|_| Error::InvalidData(format!("bad field {field:?} in clique-tree file")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> CliqueTree {
        CliqueTree::new(
            vec![VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])],
            vec![vec![1], vec![0]],
            &[2, 2, 2],
        )
        .unwrap()
    }

    #[test]
    fn structure_validation_catches_bad_trees() {
        let card = [2, 2, 2];
        // asymmetric adjacency
        assert!(matches!(
            CliqueTree::new(
                vec![VariableSet::new(&[0, 1]), VariableSet::new(&[1, 2])],
                vec![vec![1], vec![]],
                &card,
            ),
            Err(Error::StructureViolation(_))
        ));
        // disconnected
        assert!(matches!(
            CliqueTree::new(
                vec![VariableSet::new(&[0]), VariableSet::new(&[1])],
                vec![vec![], vec![]],
                &card,
            ),
            Err(Error::StructureViolation(_))
        ));
        // running intersection broken: 0 appears at both ends of a path but
        // not in the middle
        assert!(matches!(
            CliqueTree::new(
                vec![
                    VariableSet::new(&[0, 1]),
                    VariableSet::new(&[1, 2]),
                    VariableSet::new(&[0, 2]),
                ],
                vec![vec![1], vec![0, 2], vec![1]],
                &card,
            ),
            Err(Error::StructureViolation(_))
        ));
    }

    #[test]
    fn single_clique_calibrates_to_its_potential() {
        let card = [2, 2];
        let mut tree = CliqueTree::new(vec![VariableSet::new(&[0, 1])], vec![vec![]], &card).unwrap();
        let potential =
            Factor::from_values(VariableSet::new(&[0, 1]), &card, vec![1., 2., 3., 4.]).unwrap();
        tree.set_potential(0, potential.clone()).unwrap();
        tree.calibrate();
        assert_eq!(tree.calibrated(0), &potential);
        tree.calibrate_recursive();
        assert_eq!(tree.calibrated(0), &potential);
    }

    #[test]
    fn two_clique_chain_calibrates_consistently() {
        let card = [2, 2, 2];
        let mut tree = chain();
        tree.set_all_potentials(vec![
            Factor::from_values(VariableSet::new(&[0, 1]), &card, vec![1., 2., 3., 4.]).unwrap(),
            Factor::from_values(VariableSet::new(&[1, 2]), &card, vec![5., 6., 7., 8.]).unwrap(),
        ])
        .unwrap();
        tree.calibrate();

        // both beliefs project to the same separator marginal over {1}
        let left = tree.calibrated(0).sum_out(0);
        let right = tree.calibrated(1).sum_out(2);
        assert!(left.max_difference(&right).unwrap() < 1e-12);

        // and both sum to the partition function
        let z = tree.partition();
        assert!((tree.calibrated(1).sum() - z).abs() < 1e-12);

        // hand computation: summing 2 out of [5, 6, 7, 8] over {1, 2} gives
        // the message (5+7, 6+8) on {1}, so beta_0 = [1*12, 2*12, 3*14, 4*14]
        assert_eq!(tree.calibrated(0).values(), &[12., 24., 42., 56.]);
    }

    #[test]
    fn evidence_restricted_calibration_leaves_initials_alone() {
        let card = [2, 2, 2];
        let mut tree = chain();
        tree.set_all_potentials(vec![
            Factor::from_values(VariableSet::new(&[0, 1]), &card, vec![1., 2., 3., 4.]).unwrap(),
            Factor::from_values(VariableSet::new(&[1, 2]), &card, vec![5., 6., 7., 8.]).unwrap(),
        ])
        .unwrap();
        let before: Vec<Factor> = (0..tree.len()).map(|i| tree.initial(i).clone()).collect();

        tree.calibrate_with_evidence(&[Some(1), None, None]);
        for (i, initial) in before.iter().enumerate() {
            assert_eq!(tree.initial(i), initial);
        }
        // clique 0's belief lost the evidence dimension
        assert_eq!(tree.calibrated(0).vars(), &VariableSet::new(&[1]));
        // beta_0 = pot(0)|0=1 * msg{1} = [2, 4] * [12, 14]
        assert_eq!(tree.calibrated(0).values(), &[24., 56.]);
        // separator consistency still holds
        let left = tree.calibrated(0).clone();
        let right = tree.calibrated(1).sum_out(2);
        assert!(left.max_difference(&right).unwrap() < 1e-12);
    }

    #[test]
    fn save_load_round_trips_exactly() {
        let card = [2, 2, 2];
        let mut tree = chain();
        tree.set_all_potentials(vec![
            Factor::from_values(
                VariableSet::new(&[0, 1]),
                &card,
                vec![0.1, 0.2, 0.30000000000000004, 1e-300],
            )
            .unwrap(),
            Factor::from_values(VariableSet::new(&[1, 2]), &card, vec![5., 6., 7., 8.]).unwrap(),
        ])
        .unwrap();

        let mut buffer = Vec::new();
        tree.save(&mut buffer).unwrap();
        let loaded = CliqueTree::load(&mut &buffer[..]).unwrap();

        assert_eq!(loaded.len(), tree.len());
        assert_eq!(loaded.cardinalities(), tree.cardinalities());
        for i in 0..tree.len() {
            assert_eq!(loaded.vars(i), tree.vars(i));
            assert_eq!(loaded.neighbours(i), tree.neighbours(i));
            assert_eq!(loaded.initial(i).values(), tree.initial(i).values());
        }
    }

    #[test]
    fn load_rejects_garbage() {
        assert!(CliqueTree::load(&mut &b"not a tree"[..]).is_err());
        assert!(CliqueTree::load(&mut &b"cliquetree 1\n2 3\n2 2 2\n0 1\n1\n"[..]).is_err());
    }
}
