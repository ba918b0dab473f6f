//! Structural call-graph queries.
//!
//! Each operation loads the project graph from the store (the scroll holds
//! one pooled connection; the graph itself is request-local), answers from
//! the in-memory indexes, and reports timing in the response envelope.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RecallError;
use crate::graph::{CallGraph, CallType};
use crate::store::call_graph::CallGraphStore;
use crate::store::client::ClientFactory;

/// Coarse change-risk bucket from a dependent count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactRadius {
    Low,
    Medium,
    High,
}

/// `> 20` dependents is high, `10..=20` medium, below that low.
pub fn impact_radius(dependent_count: usize) -> ImpactRadius {
    if dependent_count > 20 {
        ImpactRadius::High
    } else if dependent_count >= 10 {
        ImpactRadius::Medium
    } else {
        ImpactRadius::Low
    }
}

/// One edge in a file dependency report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub file: String,
    pub transitive: bool,
}

/// Forward dependencies of a file.
#[derive(Debug, Clone, Default)]
pub struct FileDependencyReport {
    pub dependencies: Vec<DependencyEdge>,
}

/// Reverse dependencies of a file.
#[derive(Debug, Clone, Default)]
pub struct FileDependentReport {
    pub dependents: Vec<DependencyEdge>,
}

/// External file-dependency analysis the orchestrator delegates to.
#[async_trait]
pub trait FileDependencyProvider: Send + Sync {
    async fn file_dependencies(
        &self,
        file_path: &str,
        project_name: &str,
        include_transitive: bool,
    ) -> Result<FileDependencyReport, RecallError>;

    async fn file_dependents(
        &self,
        file_path: &str,
        project_name: &str,
        include_transitive: bool,
    ) -> Result<FileDependentReport, RecallError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CallerEntry {
    pub caller_function: String,
    pub caller_file: String,
    pub caller_line: u32,
    pub call_type: CallType,
    pub language: String,
    pub is_async: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindCallersResponse {
    pub function: String,
    pub project: String,
    pub callers: Vec<CallerEntry>,
    pub total_callers: usize,
    pub direct_callers: usize,
    pub indirect_callers: usize,
    pub analysis_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalleeEntry {
    pub callee_function: String,
    pub callee_file: String,
    pub callee_line: u32,
    pub call_site_line: u32,
    pub call_type: CallType,
    pub language: String,
    pub is_async: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindCalleesResponse {
    pub function: String,
    pub project: String,
    pub callees: Vec<CalleeEntry>,
    pub total_callees: usize,
    pub direct_callees: usize,
    pub indirect_callees: usize,
    pub analysis_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImplementationEntry {
    pub class_name: String,
    pub file_path: String,
    pub language: String,
    pub methods: Vec<String>,
    pub method_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindImplementationsResponse {
    pub interface: String,
    pub project: String,
    pub implementations: Vec<ImplementationEntry>,
    pub total_implementations: usize,
    pub languages: Vec<String>,
    pub analysis_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindDependenciesResponse {
    pub file: String,
    pub project: String,
    pub dependencies: Vec<DependencyEdge>,
    pub total_dependencies: usize,
    pub direct_dependencies: usize,
    pub transitive_dependencies: usize,
    pub analysis_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindDependentsResponse {
    pub file: String,
    pub project: String,
    pub dependents: Vec<DependencyEdge>,
    pub total_dependents: usize,
    pub direct_dependents: usize,
    pub transitive_dependents: usize,
    pub impact_radius: ImpactRadius,
    pub analysis_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallEdgeDetail {
    pub caller: String,
    pub callee: String,
    pub file: String,
    pub line: u32,
    pub call_type: CallType,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallPathDetail {
    pub path: Vec<String>,
    pub length: usize,
    pub call_details: Vec<CallEdgeDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallChainResponse {
    pub from: String,
    pub to: String,
    pub project: String,
    pub paths: Vec<CallPathDetail>,
    pub total_paths: usize,
    pub shortest_path_length: usize,
    pub longest_path_length: usize,
    pub analysis_time_ms: f64,
}

/// User-facing structural operations over a project's call graph.
pub struct StructuralQueryService<F: ClientFactory> {
    store: Arc<CallGraphStore<F>>,
    project_name: String,
    dependency_provider: Option<Arc<dyn FileDependencyProvider>>,
}

impl<F: ClientFactory> StructuralQueryService<F> {
    pub fn new(store: Arc<CallGraphStore<F>>, project_name: impl Into<String>) -> Self {
        Self {
            store,
            project_name: project_name.into(),
            dependency_provider: None,
        }
    }

    pub fn with_dependency_provider(mut self, provider: Arc<dyn FileDependencyProvider>) -> Self {
        self.dependency_provider = Some(provider);
        self
    }

    fn project<'a>(&'a self, project_name: Option<&'a str>) -> &'a str {
        project_name.unwrap_or(&self.project_name)
    }

    async fn load_graph(&self, project: &str, context: &str) -> Result<CallGraph, RecallError> {
        self.store
            .load_call_graph(project)
            .await
            .map_err(|e| RecallError::Retrieval(format!("failed to {context}: {e}")))
    }

    /// All functions calling `function_name`, one row per relevant call site.
    pub async fn find_callers(
        &self,
        function_name: &str,
        project_name: Option<&str>,
        include_indirect: bool,
        max_depth: usize,
        limit: usize,
    ) -> Result<FindCallersResponse, RecallError> {
        let start = Instant::now();
        let project = self.project(project_name);
        let graph = self.load_graph(project, "find callers").await?;

        let caller_nodes = graph.find_callers(function_name, include_indirect, max_depth);

        let mut callers = Vec::new();
        for caller in caller_nodes.iter().take(limit) {
            let sites = graph.call_sites_for_caller(&caller.qualified_name);
            for site in sites.iter().filter(|s| s.callee_function == function_name) {
                callers.push(CallerEntry {
                    caller_function: caller.qualified_name.clone(),
                    caller_file: caller.file_path.clone(),
                    caller_line: site.caller_line,
                    call_type: site.call_type,
                    language: caller.language.clone(),
                    is_async: caller.is_async,
                });
            }
        }

        let direct_names = graph.direct_callers(function_name);
        let direct_callers = callers
            .iter()
            .filter(|entry| {
                direct_names.is_some_and(|names| names.contains(&entry.caller_function))
            })
            .count();
        let total_callers = callers.len();
        callers.truncate(limit);

        let analysis_time_ms = elapsed_ms(start);
        tracing::info!(
            function = function_name,
            total = total_callers,
            direct = direct_callers,
            time_ms = analysis_time_ms,
            "found callers"
        );

        Ok(FindCallersResponse {
            function: function_name.to_string(),
            project: project.to_string(),
            callers,
            total_callers,
            direct_callers,
            indirect_callers: total_callers - direct_callers,
            analysis_time_ms,
        })
    }

    /// All functions called by `function_name`. With `include_indirect`,
    /// transitive callees unreachable through a direct site are appended with
    /// an `indirect` call type and a zero call-site line.
    pub async fn find_callees(
        &self,
        function_name: &str,
        project_name: Option<&str>,
        include_indirect: bool,
        max_depth: usize,
        limit: usize,
    ) -> Result<FindCalleesResponse, RecallError> {
        let start = Instant::now();
        let project = self.project(project_name);
        let graph = self.load_graph(project, "find callees").await?;

        let callee_nodes = graph.find_callees(function_name, include_indirect, max_depth);
        let call_sites = graph.call_sites_for_caller(function_name);

        let mut callees = Vec::new();
        for site in call_sites.iter().take(limit) {
            if let Some(callee) = graph.node(&site.callee_function) {
                callees.push(CalleeEntry {
                    callee_function: callee.qualified_name.clone(),
                    callee_file: callee.file_path.clone(),
                    callee_line: callee.start_line,
                    call_site_line: site.caller_line,
                    call_type: site.call_type,
                    language: callee.language.clone(),
                    is_async: callee.is_async,
                });
            }
        }

        if include_indirect {
            for node in &callee_nodes {
                if !callees
                    .iter()
                    .any(|entry| entry.callee_function == node.qualified_name)
                {
                    callees.push(CalleeEntry {
                        callee_function: node.qualified_name.clone(),
                        callee_file: node.file_path.clone(),
                        callee_line: node.start_line,
                        call_site_line: 0,
                        call_type: CallType::Indirect,
                        language: node.language.clone(),
                        is_async: node.is_async,
                    });
                }
            }
        }

        let direct_callees = callees
            .iter()
            .filter(|entry| entry.call_type != CallType::Indirect)
            .count();
        let total_callees = callees.len();
        callees.truncate(limit);

        let analysis_time_ms = elapsed_ms(start);
        tracing::info!(
            function = function_name,
            total = total_callees,
            direct = direct_callees,
            time_ms = analysis_time_ms,
            "found callees"
        );

        Ok(FindCalleesResponse {
            function: function_name.to_string(),
            project: project.to_string(),
            callees,
            total_callees,
            direct_callees,
            indirect_callees: total_callees - direct_callees,
            analysis_time_ms,
        })
    }

    /// Implementations of an interface, straight from the store. A project
    /// of `"global"` searches across projects.
    pub async fn find_implementations(
        &self,
        interface_name: &str,
        project_name: Option<&str>,
        language: Option<&str>,
        limit: usize,
    ) -> Result<FindImplementationsResponse, RecallError> {
        let start = Instant::now();
        let project = self.project(project_name);
        let project_filter = (project != "global").then_some(project);

        let mut implementations = self
            .store
            .implementations(interface_name, project_filter)
            .await
            .map_err(|e| RecallError::Retrieval(format!("failed to find implementations: {e}")))?;

        if let Some(language) = language {
            implementations.retain(|i| i.language.eq_ignore_ascii_case(language));
        }

        let mut languages: BTreeSet<String> = BTreeSet::new();
        let entries: Vec<ImplementationEntry> = implementations
            .iter()
            .take(limit)
            .map(|implementation| {
                languages.insert(implementation.language.clone());
                ImplementationEntry {
                    class_name: implementation.implementation_name.clone(),
                    file_path: implementation.file_path.clone(),
                    language: implementation.language.clone(),
                    method_count: implementation.methods.len(),
                    methods: implementation.methods.clone(),
                }
            })
            .collect();

        let analysis_time_ms = elapsed_ms(start);
        tracing::info!(
            interface = interface_name,
            total = entries.len(),
            time_ms = analysis_time_ms,
            "found implementations"
        );

        Ok(FindImplementationsResponse {
            interface: interface_name.to_string(),
            project: project.to_string(),
            total_implementations: entries.len(),
            implementations: entries,
            languages: languages.into_iter().collect(),
            analysis_time_ms,
        })
    }

    /// What a file imports, via the external dependency provider.
    pub async fn find_dependencies(
        &self,
        file_path: &str,
        project_name: Option<&str>,
        include_transitive: bool,
    ) -> Result<FindDependenciesResponse, RecallError> {
        let start = Instant::now();
        let project = self.project(project_name);
        let provider = self.dependency_provider.as_ref().ok_or_else(|| {
            RecallError::Retrieval("file dependency analysis is not configured".into())
        })?;

        let report = provider
            .file_dependencies(file_path, project, include_transitive)
            .await?;

        let total = report.dependencies.len();
        let transitive = report.dependencies.iter().filter(|d| d.transitive).count();

        Ok(FindDependenciesResponse {
            file: file_path.to_string(),
            project: project.to_string(),
            dependencies: report.dependencies,
            total_dependencies: total,
            direct_dependencies: total - transitive,
            transitive_dependencies: transitive,
            analysis_time_ms: elapsed_ms(start),
        })
    }

    /// What imports a file, with an impact-radius summary.
    pub async fn find_dependents(
        &self,
        file_path: &str,
        project_name: Option<&str>,
        include_transitive: bool,
    ) -> Result<FindDependentsResponse, RecallError> {
        let start = Instant::now();
        let project = self.project(project_name);
        let provider = self.dependency_provider.as_ref().ok_or_else(|| {
            RecallError::Retrieval("file dependency analysis is not configured".into())
        })?;

        let report = provider
            .file_dependents(file_path, project, include_transitive)
            .await?;

        let total = report.dependents.len();
        let transitive = report.dependents.iter().filter(|d| d.transitive).count();

        Ok(FindDependentsResponse {
            file: file_path.to_string(),
            project: project.to_string(),
            dependents: report.dependents,
            total_dependents: total,
            direct_dependents: total - transitive,
            transitive_dependents: transitive,
            impact_radius: impact_radius(total),
            analysis_time_ms: elapsed_ms(start),
        })
    }

    /// All call paths between two functions, each edge annotated with its
    /// call site.
    pub async fn get_call_chain(
        &self,
        from_function: &str,
        to_function: &str,
        project_name: Option<&str>,
        max_paths: usize,
        max_depth: usize,
    ) -> Result<CallChainResponse, RecallError> {
        let start = Instant::now();
        let project = self.project(project_name);
        let graph = self.load_graph(project, "find call chain").await?;

        let paths = graph.find_call_chain(from_function, to_function, max_depth, max_paths);

        let path_details: Vec<CallPathDetail> = paths
            .iter()
            .map(|path| {
                let mut call_details = Vec::new();
                for window in path.windows(2) {
                    let (caller, callee) = (&window[0], &window[1]);
                    let sites = graph.call_sites_for_caller(caller);
                    if let Some(site) = sites.iter().find(|s| &s.callee_function == callee) {
                        call_details.push(CallEdgeDetail {
                            caller: caller.clone(),
                            callee: callee.clone(),
                            file: site.caller_file.clone(),
                            line: site.caller_line,
                            call_type: site.call_type,
                        });
                    }
                }
                CallPathDetail {
                    path: path.clone(),
                    length: path.len(),
                    call_details,
                }
            })
            .collect();

        let shortest_path_length = paths.iter().map(Vec::len).min().unwrap_or(0);
        let longest_path_length = paths.iter().map(Vec::len).max().unwrap_or(0);

        let analysis_time_ms = elapsed_ms(start);
        tracing::info!(
            from = from_function,
            to = to_function,
            paths = paths.len(),
            shortest = shortest_path_length,
            longest = longest_path_length,
            time_ms = analysis_time_ms,
            "found call chains"
        );

        Ok(CallChainResponse {
            from: from_function.to_string(),
            to: to_function.to_string(),
            project: project.to_string(),
            total_paths: paths.len(),
            paths: path_details,
            shortest_path_length,
            longest_path_length,
            analysis_time_ms,
        })
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}
