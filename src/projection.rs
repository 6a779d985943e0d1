use std::cmp::Ordering;

use crate::model::{FilterState, SortMode, WorkloadRecord};

const FAMILY_STEP: u32 = 100;

/// Produces the rows actually shown in the main table.
///
/// The snapshot itself is never reordered; every call starts from the order the
/// cluster returned, so identical inputs always give identical output.
pub fn project(
    snapshot: &[WorkloadRecord],
    filter: &FilterState,
    identity: &str,
) -> Vec<WorkloadRecord> {
    let mut rows = snapshot
        .iter()
        .filter(|record| !filter.only_mine || record.name.starts_with(identity))
        .filter(|record| filter.status.admits(record.status))
        .cloned()
        .collect::<Vec<_>>();

    rows.sort_by(|left, right| compare(filter.sort, left, right));
    rows
}

fn compare(mode: SortMode, left: &WorkloadRecord, right: &WorkloadRecord) -> Ordering {
    let ordering = match mode {
        SortMode::AgeDesc | SortMode::AgeAsc => {
            parse_compact_minutes(&left.age).cmp(&parse_compact_minutes(&right.age))
        }
        SortMode::GpuCountAsc | SortMode::GpuCountDesc => left.gpu_count.cmp(&right.gpu_count),
        SortMode::DurationDesc | SortMode::DurationAsc => {
            parse_compact_minutes(&left.duration).cmp(&parse_compact_minutes(&right.duration))
        }
        SortMode::GpuTypeDesc | SortMode::GpuTypeAsc => {
            gpu_type_rank(&left.gpu.label()).cmp(&gpu_type_rank(&right.gpu.label()))
        }
    };

    if mode.descending() {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Total minutes of a `{d}d{h}h{m}m` string. Missing segments count as zero and
/// anything unparseable (including the `–` sentinel) yields zero.
pub fn parse_compact_minutes(value: &str) -> u64 {
    let mut total = 0_u64;
    let mut digits = String::new();

    for ch in value.trim().chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let Ok(amount) = digits.parse::<u64>() else {
            return 0;
        };
        digits.clear();

        let factor = match ch {
            'd' => 24 * 60,
            'h' => 60,
            'm' => 1,
            _ => return 0,
        };
        total = total.saturating_add(amount.saturating_mul(factor));
    }

    if digits.is_empty() { total } else { 0 }
}

/// Composite rank for the GPU TYPE order. Family dominates; memory class only
/// separates entries of the same family.
pub fn gpu_type_rank(label: &str) -> u32 {
    let family = if label.contains("H200") {
        3
    } else if label.contains("H100") {
        2
    } else if label.contains("A100") {
        1
    } else {
        0
    };

    let memory = if label.contains("80G") {
        2
    } else if label.contains("40G") {
        1
    } else {
        0
    };

    family * FAMILY_STEP + memory
}

#[cfg(test)]
mod tests {
    use super::{gpu_type_rank, parse_compact_minutes, project};
    use crate::model::{
        FilterState, GpuDescriptor, GpuFamily, GpuMemory, GpuSummary, SortMode, StatusFilter,
        WorkloadRecord, WorkloadStatus,
    };

    fn record(
        name: &str,
        status: WorkloadStatus,
        age: &str,
        duration: &str,
        gpu: GpuSummary,
    ) -> WorkloadRecord {
        let gpu_count = match gpu {
            GpuSummary::NoGpu => 0,
            GpuSummary::Waiting(descriptor) | GpuSummary::Assigned(descriptor) => descriptor.count,
        };
        WorkloadRecord {
            name: name.to_string(),
            owner: None,
            status,
            completions: "0/1".to_string(),
            duration: duration.to_string(),
            age: age.to_string(),
            pod_count: 1,
            gpu_count,
            gpu,
        }
    }

    fn gpu(count: u32, family: Option<GpuFamily>, memory: Option<GpuMemory>) -> GpuSummary {
        GpuSummary::Assigned(GpuDescriptor {
            count,
            family,
            memory,
        })
    }

    fn sample() -> Vec<WorkloadRecord> {
        vec![
            record(
                "alice-train",
                WorkloadStatus::Running,
                "2h5m",
                "1h0m",
                gpu(4, Some(GpuFamily::A100), Some(GpuMemory::Gb80)),
            ),
            record(
                "bob-eval",
                WorkloadStatus::Failed,
                "1d0h0m",
                "10m",
                gpu(1, Some(GpuFamily::H200), None),
            ),
            record(
                "alice-prep",
                WorkloadStatus::Pending,
                "5m",
                "–",
                GpuSummary::Waiting(GpuDescriptor {
                    count: 2,
                    family: Some(GpuFamily::H100),
                    memory: Some(GpuMemory::Gb80),
                }),
            ),
            record(
                "carol-etl",
                WorkloadStatus::Complete,
                "45m",
                "30m",
                GpuSummary::NoGpu,
            ),
        ]
    }

    fn names(rows: &[WorkloadRecord]) -> Vec<&str> {
        rows.iter().map(|row| row.name.as_str()).collect()
    }

    #[test]
    fn compact_minutes_parse_each_unit() {
        assert_eq!(parse_compact_minutes("1d1h3m"), 24 * 60 + 63);
        assert_eq!(parse_compact_minutes("45m"), 45);
        assert_eq!(parse_compact_minutes("2h"), 120);
        assert_eq!(parse_compact_minutes("–"), 0);
        assert_eq!(parse_compact_minutes(""), 0);
        assert_eq!(parse_compact_minutes("12"), 0);
        assert_eq!(parse_compact_minutes("3x"), 0);
    }

    #[test]
    fn family_dominates_memory_in_type_rank() {
        assert!(gpu_type_rank("H200") > gpu_type_rank("H100-80G"));
        assert!(gpu_type_rank("H100") > gpu_type_rank("A100-80G"));
        assert!(gpu_type_rank("A100-80G") > gpu_type_rank("A100-40G"));
        assert!(gpu_type_rank("A100-40G") > gpu_type_rank("A100"));
        assert!(gpu_type_rank("A100") > gpu_type_rank("2 GPU"));
        assert_eq!(gpu_type_rank("No GPU"), 0);
        assert_eq!(gpu_type_rank("⏳ H100-80G"), gpu_type_rank("H100-80G"));
    }

    #[test]
    fn default_state_sorts_by_age_descending() {
        let rows = project(&sample(), &FilterState::default(), "alice");
        assert_eq!(
            names(&rows),
            vec!["bob-eval", "alice-train", "carol-etl", "alice-prep"]
        );
    }

    #[test]
    fn ownership_filter_keeps_name_prefixed_records() {
        let filter = FilterState {
            only_mine: true,
            ..FilterState::default()
        };
        let snapshot = sample();
        let rows = project(&snapshot, &filter, "alice");
        assert!(rows.len() <= snapshot.len());
        assert!(rows.iter().all(|row| row.name.starts_with("alice")));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn status_filter_matches_exactly() {
        let filter = FilterState {
            status: StatusFilter::Failed,
            ..FilterState::default()
        };
        let rows = project(&sample(), &filter, "alice");
        assert_eq!(names(&rows), vec!["bob-eval"]);
    }

    #[test]
    fn gpu_count_orders_use_numeric_count() {
        let ascending = FilterState {
            sort: SortMode::GpuCountAsc,
            ..FilterState::default()
        };
        let rows = project(&sample(), &ascending, "alice");
        assert_eq!(
            names(&rows),
            vec!["carol-etl", "bob-eval", "alice-prep", "alice-train"]
        );

        let descending = FilterState {
            sort: SortMode::GpuCountDesc,
            ..FilterState::default()
        };
        let rows = project(&sample(), &descending, "alice");
        assert_eq!(rows.first().map(|row| row.name.as_str()), Some("alice-train"));
    }

    #[test]
    fn gpu_type_order_ranks_waiting_by_embedded_descriptor() {
        let filter = FilterState {
            sort: SortMode::GpuTypeDesc,
            ..FilterState::default()
        };
        let rows = project(&sample(), &filter, "alice");
        assert_eq!(
            names(&rows),
            vec!["bob-eval", "alice-prep", "alice-train", "carol-etl"]
        );
    }

    fn sorted(sort: SortMode) -> Vec<WorkloadRecord> {
        let filter = FilterState {
            sort,
            ..FilterState::default()
        };
        project(&sample(), &filter, "alice")
    }

    #[test]
    fn age_ascending_puts_youngest_first() {
        assert_eq!(
            names(&sorted(SortMode::AgeAsc)),
            vec!["alice-prep", "carol-etl", "alice-train", "bob-eval"]
        );
    }

    #[test]
    fn duration_orders_read_duration_not_age() {
        assert_eq!(
            names(&sorted(SortMode::DurationAsc)),
            vec!["alice-prep", "bob-eval", "carol-etl", "alice-train"]
        );
        assert_eq!(
            names(&sorted(SortMode::DurationDesc)),
            vec!["alice-train", "carol-etl", "bob-eval", "alice-prep"]
        );
    }

    #[test]
    fn gpu_type_ascending_starts_without_gpu() {
        assert_eq!(
            names(&sorted(SortMode::GpuTypeAsc)),
            vec!["carol-etl", "alice-train", "alice-prep", "bob-eval"]
        );
    }

    #[test]
    fn every_mode_is_idempotent_on_sorted_input() {
        let snapshot = sample();
        for sort in SortMode::ALL {
            let filter = FilterState {
                sort,
                ..FilterState::default()
            };
            let once = project(&snapshot, &filter, "alice");
            let twice = project(&once, &filter, "alice");
            assert_eq!(once, twice, "sort mode {}", sort.title());
        }
    }

    #[test]
    fn equal_keys_keep_snapshot_order() {
        let snapshot = vec![
            record("first", WorkloadStatus::Running, "5m", "5m", GpuSummary::NoGpu),
            record("second", WorkloadStatus::Running, "5m", "5m", GpuSummary::NoGpu),
            record("third", WorkloadStatus::Running, "5m", "5m", GpuSummary::NoGpu),
        ];
        for sort in SortMode::ALL {
            let filter = FilterState {
                sort,
                ..FilterState::default()
            };
            let rows = project(&snapshot, &filter, "x");
            assert_eq!(names(&rows), vec!["first", "second", "third"]);
        }
    }
}
