//! Diagnostics and exploratory analysis on pipeline outputs

pub mod diagnostics;
pub mod mca;
pub mod correlation;

pub use diagnostics::{
    competition_ranks, kendall_tau, rank_states, ranks_to_frame, tau_table, taus_to_frame, KendallTau, RankRow,
    TauRow,
};
pub use mca::{fit_mca, Category, CategorySplit, McaResult};
pub use correlation::{correlation_matrix, pearson, CorrelationMatrix};
