use std::fmt::{Display, Formatter};

pub const NO_GPU_LABEL: &str = "No GPU";
pub const WAITING_MARK: &str = "⏳";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum WorkloadStatus {
    Running,
    Complete,
    Failed,
    Pending,
}

impl WorkloadStatus {
    pub fn title(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Pending => "Pending",
        }
    }
}

impl Display for WorkloadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum GpuFamily {
    A100,
    H100,
    H200,
}

impl GpuFamily {
    pub fn title(self) -> &'static str {
        match self {
            Self::A100 => "A100",
            Self::H100 => "H100",
            Self::H200 => "H200",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum GpuMemory {
    Gb40,
    Gb80,
}

impl GpuMemory {
    pub fn title(self) -> &'static str {
        match self {
            Self::Gb40 => "40G",
            Self::Gb80 => "80G",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GpuDescriptor {
    pub count: u32,
    pub family: Option<GpuFamily>,
    pub memory: Option<GpuMemory>,
}

impl Display for GpuDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.family, self.memory) {
            (None, _) => write!(f, "{} GPU", self.count),
            (Some(family), None) => f.write_str(family.title()),
            (Some(family), Some(memory)) => write!(f, "{}-{}", family.title(), memory.title()),
        }
    }
}

/// Accelerator summary shown in the GPU column.
///
/// `Waiting` marks a pending workload that has no pods yet; it renders with a
/// leading hourglass so the descriptor text stays embedded for ranking.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GpuSummary {
    NoGpu,
    Waiting(GpuDescriptor),
    Assigned(GpuDescriptor),
}

impl GpuSummary {
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl Display for GpuSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoGpu => f.write_str(NO_GPU_LABEL),
            Self::Waiting(descriptor) => write!(f, "{WAITING_MARK} {descriptor}"),
            Self::Assigned(descriptor) => write!(f, "{descriptor}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkloadRecord {
    pub name: String,
    pub owner: Option<String>,
    pub status: WorkloadStatus,
    pub completions: String,
    pub duration: String,
    pub age: String,
    pub pod_count: usize,
    pub gpu_count: u32,
    pub gpu: GpuSummary,
}

impl WorkloadRecord {
    pub fn owned_by(&self, identity: &str) -> bool {
        self.owner.as_deref() == Some(identity)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Running,
    Failed,
    Pending,
}

impl StatusFilter {
    pub fn next(self) -> Self {
        match self {
            Self::All => Self::Running,
            Self::Running => Self::Failed,
            Self::Failed => Self::Pending,
            Self::Pending => Self::All,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Pending => "Pending",
        }
    }

    pub fn admits(self, status: WorkloadStatus) -> bool {
        match self {
            Self::All => true,
            Self::Running => status == WorkloadStatus::Running,
            Self::Failed => status == WorkloadStatus::Failed,
            Self::Pending => status == WorkloadStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum SortMode {
    #[default]
    AgeDesc,
    AgeAsc,
    GpuCountAsc,
    GpuCountDesc,
    DurationDesc,
    DurationAsc,
    GpuTypeDesc,
    GpuTypeAsc,
}

impl SortMode {
    #[cfg(test)]
    pub const ALL: [Self; 8] = [
        Self::AgeDesc,
        Self::AgeAsc,
        Self::GpuCountAsc,
        Self::GpuCountDesc,
        Self::DurationDesc,
        Self::DurationAsc,
        Self::GpuTypeDesc,
        Self::GpuTypeAsc,
    ];

    pub fn next(self) -> Self {
        match self {
            Self::AgeDesc => Self::AgeAsc,
            Self::AgeAsc => Self::GpuCountAsc,
            Self::GpuCountAsc => Self::GpuCountDesc,
            Self::GpuCountDesc => Self::DurationDesc,
            Self::DurationDesc => Self::DurationAsc,
            Self::DurationAsc => Self::GpuTypeDesc,
            Self::GpuTypeDesc => Self::GpuTypeAsc,
            Self::GpuTypeAsc => Self::AgeDesc,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::AgeDesc => "Age↓",
            Self::AgeAsc => "Age↑",
            Self::GpuCountAsc => "GPU Number↑",
            Self::GpuCountDesc => "GPU Number↓",
            Self::DurationDesc => "Duration↓",
            Self::DurationAsc => "Duration↑",
            Self::GpuTypeDesc => "GPU Type↓",
            Self::GpuTypeAsc => "GPU Type↑",
        }
    }

    pub fn descending(self) -> bool {
        matches!(
            self,
            Self::AgeDesc | Self::GpuCountDesc | Self::DurationDesc | Self::GpuTypeDesc
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct FilterState {
    pub status: StatusFilter,
    pub only_mine: bool,
    pub sort: SortMode,
}

#[cfg(test)]
mod tests {
    use super::{
        GpuDescriptor, GpuFamily, GpuMemory, GpuSummary, SortMode, StatusFilter, WorkloadStatus,
    };

    #[test]
    fn status_filter_cycles_through_four_values() {
        let mut filter = StatusFilter::All;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(filter);
            filter = filter.next();
        }
        assert_eq!(filter, StatusFilter::All);
        assert_eq!(
            seen,
            vec![
                StatusFilter::All,
                StatusFilter::Running,
                StatusFilter::Failed,
                StatusFilter::Pending
            ]
        );
    }

    #[test]
    fn sort_mode_cycle_visits_every_mode_once() {
        let mut mode = SortMode::default();
        for expected in SortMode::ALL {
            assert_eq!(mode, expected);
            mode = mode.next();
        }
        assert_eq!(mode, SortMode::AgeDesc);
    }

    #[test]
    fn status_filter_admits_only_matching_status() {
        assert!(StatusFilter::All.admits(WorkloadStatus::Complete));
        assert!(StatusFilter::Failed.admits(WorkloadStatus::Failed));
        assert!(!StatusFilter::Running.admits(WorkloadStatus::Pending));
        assert!(!StatusFilter::Pending.admits(WorkloadStatus::Complete));
    }

    #[test]
    fn gpu_summary_labels() {
        let h100 = GpuDescriptor {
            count: 2,
            family: Some(GpuFamily::H100),
            memory: Some(GpuMemory::Gb80),
        };
        let unknown = GpuDescriptor {
            count: 3,
            family: None,
            memory: Some(GpuMemory::Gb40),
        };
        assert_eq!(GpuSummary::NoGpu.label(), "No GPU");
        assert_eq!(GpuSummary::Assigned(h100).label(), "H100-80G");
        assert_eq!(GpuSummary::Waiting(h100).label(), "⏳ H100-80G");
        assert_eq!(GpuSummary::Assigned(unknown).label(), "3 GPU");
    }
}
