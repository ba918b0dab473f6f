//! Call graph - function relationships and call chains.
//!
//! An in-memory directed multigraph: function nodes keyed by qualified name,
//! call sites as edges (multiplicity preserved), and forward/reverse
//! adjacency indexes for traversal. Instances are built per request and never
//! shared; every operation is an infallible pure function over this state.

pub mod extract;

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Kind of call expression at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Direct,
    Method,
    Constructor,
    Lambda,
    /// Synthesized for transitive callees in query responses
    Indirect,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Direct => "direct",
            CallType::Method => "method",
            CallType::Constructor => "constructor",
            CallType::Lambda => "lambda",
            CallType::Indirect => "indirect",
        }
    }
}

/// One textual location where one function calls another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_function: String,
    pub caller_file: String,
    pub caller_line: u32,
    pub callee_function: String,
    /// Unresolved at extraction time; filled in during indexing
    #[serde(default)]
    pub callee_file: Option<String>,
    #[serde(default)]
    pub call_type: CallType,
}

/// A function in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    /// Unique key within a project, e.g. `MyClass.method`
    pub qualified_name: String,
    pub file_path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub return_type: Option<String>,
}

/// A concrete type realizing an interface/trait/abstract class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceImplementation {
    pub interface_name: String,
    pub implementation_name: String,
    pub file_path: String,
    pub language: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Counts over the graph's entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStatistics {
    pub total_functions: usize,
    pub total_calls: usize,
    pub total_interfaces: usize,
    pub total_implementations: usize,
}

/// In-memory call graph.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: HashMap<String, FunctionNode>,
    calls: Vec<CallSite>,
    /// caller -> callees
    forward_index: HashMap<String, BTreeSet<String>>,
    /// callee -> callers
    reverse_index: HashMap<String, BTreeSet<String>>,
    implementations: HashMap<String, Vec<InterfaceImplementation>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function node, overwriting any previous node with the same
    /// qualified name.
    pub fn add_function(&mut self, node: FunctionNode) {
        tracing::debug!(qualified_name = %node.qualified_name, "added function node");
        self.nodes.insert(node.qualified_name.clone(), node);
    }

    /// Append a call site and update both adjacency indexes. Duplicate call
    /// sites are kept; multiplicity matters for per-line reporting.
    pub fn add_call(&mut self, call_site: CallSite) {
        self.forward_index
            .entry(call_site.caller_function.clone())
            .or_default()
            .insert(call_site.callee_function.clone());
        self.reverse_index
            .entry(call_site.callee_function.clone())
            .or_default()
            .insert(call_site.caller_function.clone());
        tracing::debug!(
            caller = %call_site.caller_function,
            callee = %call_site.callee_function,
            "added call"
        );
        self.calls.push(call_site);
    }

    pub fn add_implementation(&mut self, implementation: InterfaceImplementation) {
        tracing::debug!(
            implementation = %implementation.implementation_name,
            interface = %implementation.interface_name,
            "added implementation"
        );
        self.implementations
            .entry(implementation.interface_name.clone())
            .or_default()
            .push(implementation);
    }

    pub fn node(&self, qualified_name: &str) -> Option<&FunctionNode> {
        self.nodes.get(qualified_name)
    }

    pub fn nodes(&self) -> &HashMap<String, FunctionNode> {
        &self.nodes
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    /// Direct callers of `qualified_name` per the reverse index.
    pub fn direct_callers(&self, qualified_name: &str) -> Option<&BTreeSet<String>> {
        self.reverse_index.get(qualified_name)
    }

    /// Direct callees of `qualified_name` per the forward index.
    pub fn direct_callees(&self, qualified_name: &str) -> Option<&BTreeSet<String>> {
        self.forward_index.get(qualified_name)
    }

    /// Functions calling `function_name`. With `include_indirect`, walks the
    /// reverse index breadth-first up to `max_depth`. Names without a node
    /// are skipped; the start function is never returned.
    pub fn find_callers(
        &self,
        function_name: &str,
        include_indirect: bool,
        max_depth: usize,
    ) -> Vec<FunctionNode> {
        let names: Vec<String> = if !include_indirect || max_depth == 1 {
            self.reverse_index
                .get(function_name)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            self.bfs(function_name, max_depth, &self.reverse_index)
        };
        names
            .iter()
            .filter_map(|name| self.nodes.get(name).cloned())
            .collect()
    }

    /// Functions called by `function_name`; forward-index mirror of
    /// [`CallGraph::find_callers`].
    pub fn find_callees(
        &self,
        function_name: &str,
        include_indirect: bool,
        max_depth: usize,
    ) -> Vec<FunctionNode> {
        let names: Vec<String> = if !include_indirect || max_depth == 1 {
            self.forward_index
                .get(function_name)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            self.bfs(function_name, max_depth, &self.forward_index)
        };
        names
            .iter()
            .filter_map(|name| self.nodes.get(name).cloned())
            .collect()
    }

    /// Breadth-first closure over one adjacency index. A node is expanded
    /// only while its depth is below `max_depth`; the start node is removed
    /// from the result. Cycles terminate via the visited set.
    fn bfs(
        &self,
        start: &str,
        max_depth: usize,
        index: &HashMap<String, BTreeSet<String>>,
    ) -> Vec<String> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            if let Some(neighbors) = index.get(&current) {
                for neighbor in neighbors {
                    if !visited.contains(neighbor) {
                        visited.insert(neighbor.clone());
                        queue.push_back((neighbor.clone(), depth + 1));
                    }
                }
            }
        }

        visited.remove(start);
        visited.into_iter().collect()
    }

    /// All cycle-free call paths from `from_func` to `to_func`, breadth-first,
    /// capped at `max_paths` paths of at most `max_depth` vertices. Unknown
    /// endpoints yield no paths.
    pub fn find_call_chain(
        &self,
        from_func: &str,
        to_func: &str,
        max_depth: usize,
        max_paths: usize,
    ) -> Vec<Vec<String>> {
        if !self.nodes.contains_key(from_func) || !self.nodes.contains_key(to_func) {
            tracing::warn!(
                from = from_func,
                to = to_func,
                "cannot find call chain: endpoint not in graph"
            );
            return Vec::new();
        }

        let mut paths = Vec::new();
        let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();
        queue.push_back((from_func.to_string(), vec![from_func.to_string()]));

        while let Some((current, path)) = queue.pop_front() {
            if paths.len() >= max_paths {
                break;
            }
            if current == to_func {
                paths.push(path);
                continue;
            }
            if path.len() >= max_depth {
                continue;
            }
            if let Some(callees) = self.forward_index.get(&current) {
                for callee in callees {
                    if !path.iter().any(|p| p == callee) {
                        let mut next = path.clone();
                        next.push(callee.clone());
                        queue.push_back((callee.clone(), next));
                    }
                }
            }
        }

        paths
    }

    pub fn call_sites_for_caller(&self, caller_function: &str) -> Vec<CallSite> {
        self.calls
            .iter()
            .filter(|site| site.caller_function == caller_function)
            .cloned()
            .collect()
    }

    pub fn call_sites_for_callee(&self, callee_function: &str) -> Vec<CallSite> {
        self.calls
            .iter()
            .filter(|site| site.callee_function == callee_function)
            .cloned()
            .collect()
    }

    pub fn implementations_of(&self, interface_name: &str) -> Vec<InterfaceImplementation> {
        self.implementations
            .get(interface_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn statistics(&self) -> GraphStatistics {
        GraphStatistics {
            total_functions: self.nodes.len(),
            total_calls: self.calls.len(),
            total_interfaces: self.implementations.len(),
            total_implementations: self.implementations.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(qualified_name: &str) -> FunctionNode {
        FunctionNode {
            name: qualified_name.rsplit('.').next().unwrap_or(qualified_name).to_string(),
            qualified_name: qualified_name.to_string(),
            file_path: "app.py".to_string(),
            language: "python".to_string(),
            start_line: 1,
            end_line: 5,
            is_exported: true,
            is_async: false,
            parameters: vec![],
            return_type: None,
        }
    }

    fn call(caller: &str, callee: &str, line: u32) -> CallSite {
        CallSite {
            caller_function: caller.to_string(),
            caller_file: "app.py".to_string(),
            caller_line: line,
            callee_function: callee.to_string(),
            callee_file: None,
            call_type: CallType::Direct,
        }
    }

    /// main -> process -> validate -> helper, process -> clean, main -> print
    fn sample_graph() -> CallGraph {
        let mut graph = CallGraph::new();
        for name in ["main", "process", "validate", "helper", "clean"] {
            graph.add_function(node(name));
        }
        graph.add_call(call("main", "process", 2));
        graph.add_call(call("main", "print", 3));
        graph.add_call(call("process", "validate", 5));
        graph.add_call(call("process", "clean", 6));
        graph.add_call(call("validate", "helper", 8));
        graph
    }

    #[test]
    fn adjacency_indexes_track_every_call() {
        let graph = sample_graph();
        for site in graph.calls() {
            assert!(graph
                .direct_callees(&site.caller_function)
                .is_some_and(|set| set.contains(&site.callee_function)));
            assert!(graph
                .direct_callers(&site.callee_function)
                .is_some_and(|set| set.contains(&site.caller_function)));
        }
    }

    #[test]
    fn direct_callers_skip_unknown_nodes() {
        let graph = sample_graph();
        let callers = graph.find_callers("validate", false, 1);
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].qualified_name, "process");

        // "print" has a call edge but no node, so callees of main drop it.
        let callees = graph.find_callees("main", false, 1);
        let names: Vec<&str> = callees.iter().map(|n| n.qualified_name.as_str()).collect();
        assert!(names.contains(&"process"));
        assert!(!names.contains(&"print"));
    }

    #[test]
    fn transitive_callers_never_include_start() {
        let graph = sample_graph();
        let callers = graph.find_callers("helper", true, 5);
        let names: BTreeSet<&str> = callers.iter().map(|n| n.qualified_name.as_str()).collect();
        assert_eq!(names, BTreeSet::from(["main", "process", "validate"]));
        assert!(!names.contains("helper"));
    }

    #[test]
    fn max_depth_zero_yields_empty() {
        let graph = sample_graph();
        assert!(graph.find_callers("helper", true, 0).is_empty());
        assert!(graph.find_callees("main", true, 0).is_empty());
    }

    #[test]
    fn depth_limits_bound_the_closure() {
        let graph = sample_graph();
        let callees = graph.find_callees("main", true, 2);
        let names: BTreeSet<&str> = callees.iter().map(|n| n.qualified_name.as_str()).collect();
        // Depth 2 reaches process, validate, clean but not helper.
        assert_eq!(names, BTreeSet::from(["process", "validate", "clean"]));
    }

    #[test]
    fn call_chain_enumeration() {
        let graph = sample_graph();
        let paths = graph.find_call_chain("main", "helper", 10, 5);
        assert_eq!(
            paths,
            vec![vec![
                "main".to_string(),
                "process".to_string(),
                "validate".to_string(),
                "helper".to_string()
            ]]
        );
    }

    #[test]
    fn call_chain_respects_caps_and_unknown_endpoints() {
        let graph = sample_graph();
        assert!(graph.find_call_chain("main", "missing", 10, 5).is_empty());
        assert!(graph.find_call_chain("missing", "helper", 10, 5).is_empty());
        // A path of four vertices does not fit in max_depth 3.
        assert!(graph.find_call_chain("main", "helper", 3, 5).is_empty());
    }

    #[test]
    fn call_chain_from_equals_to() {
        let graph = sample_graph();
        let paths = graph.find_call_chain("main", "main", 10, 5);
        assert_eq!(paths, vec![vec!["main".to_string()]]);
    }

    #[test]
    fn cycles_terminate() {
        let mut graph = CallGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_function(node(name));
        }
        graph.add_call(call("a", "b", 1));
        graph.add_call(call("b", "c", 2));
        graph.add_call(call("c", "a", 3));

        let callers = graph.find_callers("a", true, 50);
        let names: BTreeSet<&str> = callers.iter().map(|n| n.qualified_name.as_str()).collect();
        assert_eq!(names, BTreeSet::from(["b", "c"]));

        let paths = graph.find_call_chain("a", "c", 10, 10);
        assert_eq!(paths, vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
        for path in &paths {
            let unique: BTreeSet<&String> = path.iter().collect();
            assert_eq!(unique.len(), path.len(), "paths never repeat a vertex");
        }
    }

    #[test]
    fn self_call_is_a_valid_edge() {
        let mut graph = CallGraph::new();
        graph.add_function(node("f"));
        graph.add_call(call("f", "f", 1));

        let callees = graph.find_callees("f", false, 1);
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].qualified_name, "f");
    }

    #[test]
    fn duplicate_function_overwrites_and_duplicate_call_accumulates() {
        let mut graph = CallGraph::new();
        graph.add_function(node("f"));
        let mut replacement = node("f");
        replacement.start_line = 42;
        graph.add_function(replacement);
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.node("f").map(|n| n.start_line), Some(42));

        graph.add_function(node("g"));
        graph.add_call(call("f", "g", 3));
        graph.add_call(call("f", "g", 3));
        assert_eq!(graph.calls().len(), 2);
        assert_eq!(graph.call_sites_for_caller("f").len(), 2);
        assert_eq!(graph.call_sites_for_callee("g").len(), 2);
    }

    #[test]
    fn statistics_count_everything() {
        let mut graph = sample_graph();
        graph.add_implementation(InterfaceImplementation {
            interface_name: "Storage".into(),
            implementation_name: "RedisStorage".into(),
            file_path: "store.py".into(),
            language: "python".into(),
            methods: vec!["get".into(), "put".into()],
        });
        graph.add_implementation(InterfaceImplementation {
            interface_name: "Storage".into(),
            implementation_name: "SqlStorage".into(),
            file_path: "store.py".into(),
            language: "python".into(),
            methods: vec!["get".into()],
        });

        let stats = graph.statistics();
        assert_eq!(stats.total_functions, 5);
        assert_eq!(stats.total_calls, 5);
        assert_eq!(stats.total_interfaces, 1);
        assert_eq!(stats.total_implementations, 2);
        assert_eq!(graph.implementations_of("Storage").len(), 2);
        assert!(graph.implementations_of("Missing").is_empty());
    }
}
