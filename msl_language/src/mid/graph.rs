use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Order `nodes` so that every node comes after the nodes it depends on.
///
/// Fails with the offending nodes if the dependencies contain a cycle, including a node depending on itself.
pub fn dependency_order<T: Eq + Hash + Copy, C: IntoIterator<Item = T>>(
    nodes: impl IntoIterator<Item = T>,
    dependencies: impl Fn(T) -> C,
) -> Result<Vec<T>, Vec<T>> {
    let components = find_strongly_connected_components(nodes, &dependencies);

    let mut order = vec![];
    for component in components {
        let self_loop = match component.as_slice() {
            &[node] => dependencies(node).into_iter().any(|dep| dep == node),
            _ => true,
        };
        if self_loop {
            let mut component = component;
            component.reverse();
            return Err(component);
        }
        order.extend(component);
    }
    Ok(order)
}

/// Strongly connected components, each component listed after every component it can reach.
pub fn find_strongly_connected_components<T: Eq + Hash + Copy, C: IntoIterator<Item = T>>(
    nodes: impl IntoIterator<Item = T>,
    children: impl Fn(T) -> C,
) -> Vec<Vec<T>> {
    // path-based strong component algorithm
    let mut state = SccState {
        node_to_number: HashMap::new(),
        node_has_component: HashSet::new(),
        components: vec![],
        stack_p: vec![],
        stack_s: vec![],
    };

    for v in nodes {
        let _ = state.visit(&children, v);
    }

    state.components
}

struct SccState<T> {
    node_to_number: HashMap<T, usize>,
    node_has_component: HashSet<T>,
    components: Vec<Vec<T>>,
    stack_p: Vec<T>,
    stack_s: Vec<T>,
}

impl<T: Eq + Hash + Copy> SccState<T> {
    /// Returns whether this was the first visit of `v`.
    #[must_use]
    fn visit<C: IntoIterator<Item = T>>(&mut self, children: &impl Fn(T) -> C, v: T) -> bool {
        let c = self.node_to_number.len();
        match self.node_to_number.entry(v) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(e) => {
                e.insert(c);
            }
        }

        self.stack_s.push(v);
        self.stack_p.push(v);

        for w in children(v) {
            let tree_edge = self.visit(children, w);

            // w was seen before and is still open: collapse the path down to it
            if !tree_edge && !self.node_has_component.contains(&w) {
                let w_number = self.node_to_number[&w];
                while let Some(top) = self.stack_p.last() {
                    if self.node_to_number[top] <= w_number {
                        break;
                    }
                    self.stack_p.pop();
                }
            }
        }

        if self.stack_p.last() == Some(&v) {
            let mut component = vec![];
            while let Some(w) = self.stack_s.pop() {
                self.node_has_component.insert(w);
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
            self.stack_p.pop();
        }

        true
    }
}

#[cfg(test)]
mod test {
    use crate::mid::graph::{dependency_order, find_strongly_connected_components};
    use std::collections::HashMap;

    fn edges(list: &[(u32, &[u32])]) -> HashMap<u32, Vec<u32>> {
        list.iter().map(|&(k, v)| (k, v.to_vec())).collect()
    }

    #[test]
    fn components() {
        let graph = edges(&[(0, &[1]), (1, &[2]), (2, &[0, 3]), (3, &[]), (4, &[3])]);
        let mut components = find_strongly_connected_components(0..5, |n| graph[&n].clone());
        for c in &mut components {
            c.sort();
        }
        assert_eq!(components, vec![vec![3], vec![0, 1, 2], vec![4]]);
    }

    #[test]
    fn order_respects_dependencies() {
        let graph = edges(&[(0, &[2]), (1, &[0, 2]), (2, &[]), (3, &[1])]);
        let order = dependency_order(0..4, |n| graph[&n].clone()).unwrap();
        let position = |n: u32| order.iter().position(|&x| x == n).unwrap();
        for (&node, deps) in &graph {
            for &dep in deps {
                assert!(position(dep) < position(node));
            }
        }
    }

    #[test]
    fn cycles_rejected() {
        let graph = edges(&[(0, &[1]), (1, &[0]), (2, &[])]);
        let mut cycle = dependency_order(0..3, |n| graph[&n].clone()).unwrap_err();
        cycle.sort();
        assert_eq!(cycle, vec![0, 1]);

        let graph = edges(&[(0, &[0])]);
        assert_eq!(dependency_order(0..1, |n| graph[&n].clone()).unwrap_err(), vec![0]);
    }
}
