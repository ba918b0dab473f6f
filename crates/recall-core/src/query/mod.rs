//! Query orchestration - the user-facing operations.
//!
//! Structural queries answer callers/callees/implementations/chains from the
//! persisted call graph; hybrid retrieval fuses vector similarity with BM25
//! over the memory corpus.

pub mod retrieve;
pub mod structural;

pub use retrieve::{RetrievalService, VECTOR_CANDIDATES};
pub use structural::{
    impact_radius, CallChainResponse, CallEdgeDetail, CallPathDetail, CalleeEntry, CallerEntry,
    DependencyEdge, FileDependencyProvider, FileDependencyReport, FileDependentReport,
    FindCallersResponse, FindCalleesResponse, FindDependenciesResponse, FindDependentsResponse,
    FindImplementationsResponse, ImpactRadius, ImplementationEntry, StructuralQueryService,
};
