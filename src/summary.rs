use crate::model::{GpuDescriptor, GpuFamily, GpuMemory, GpuSummary, WorkloadStatus};

pub const ELAPSED_UNKNOWN: &str = "–";
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";
pub const GPU_PRODUCT_SELECTOR: &str = "nvidia.com/gpu.product";

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct WorkloadCounts {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

pub fn derive_status(counts: WorkloadCounts) -> WorkloadStatus {
    if counts.active > 0 {
        WorkloadStatus::Running
    } else if counts.succeeded > 0 {
        WorkloadStatus::Complete
    } else if counts.failed > 0 {
        WorkloadStatus::Failed
    } else {
        WorkloadStatus::Pending
    }
}

pub fn format_completions(succeeded: i32, target: Option<i32>) -> String {
    format!("{succeeded}/{}", target.unwrap_or(1))
}

/// Compact `{d}d{h}h{m}m` rendering; leading zero units are dropped.
pub fn format_elapsed(seconds: i64) -> String {
    let minutes_total = seconds.max(0) / 60;
    let days = minutes_total / (24 * 60);
    let hours = (minutes_total / 60) % 24;
    let minutes = minutes_total % 60;

    if days > 0 {
        format!("{days}d{hours}h{minutes}m")
    } else if hours > 0 {
        format!("{hours}h{minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Start to completion, or start to `now` while the workload is still going.
pub fn format_duration(start: Option<i64>, completion: Option<i64>, now: i64) -> String {
    let Some(start) = start else {
        return ELAPSED_UNKNOWN.to_string();
    };
    format_elapsed(completion.unwrap_or(now) - start)
}

pub fn format_age(created: Option<i64>, now: i64) -> String {
    let Some(created) = created else {
        return ELAPSED_UNKNOWN.to_string();
    };
    format_elapsed(now - created)
}

/// Picks the accelerator model out of the scheduling constraints: an explicit
/// node selector wins over node-affinity expressions.
pub fn gpu_model_selector<'a>(
    node_selector: impl IntoIterator<Item = (&'a str, &'a str)>,
    affinity: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    node_selector
        .into_iter()
        .find(|(key, _)| *key == GPU_PRODUCT_SELECTOR)
        .or_else(|| {
            affinity
                .into_iter()
                .find(|(key, _)| *key == GPU_PRODUCT_SELECTOR)
        })
        .map(|(_, value)| value.to_string())
}

pub fn detect_family(model: &str) -> Option<GpuFamily> {
    if model.contains("A100") {
        Some(GpuFamily::A100)
    } else if model.contains("H100") {
        Some(GpuFamily::H100)
    } else if model.contains("H200") {
        Some(GpuFamily::H200)
    } else {
        None
    }
}

pub fn detect_memory(model: &str) -> Option<GpuMemory> {
    if model.contains("40GB") || model.contains("40G") {
        Some(GpuMemory::Gb40)
    } else if model.contains("80GB") || model.contains("80G") {
        Some(GpuMemory::Gb80)
    } else {
        None
    }
}

pub fn parse_gpu_quantity(raw: Option<&str>) -> u32 {
    raw.map(str::trim)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(0)
}

pub fn summarize_gpu(
    count: u32,
    model_selector: Option<&str>,
    status: WorkloadStatus,
    pod_count: usize,
) -> GpuSummary {
    let model = model_selector.unwrap_or_default();
    let family = detect_family(model);
    let descriptor = GpuDescriptor {
        count,
        family,
        memory: family.and_then(|_| detect_memory(model)),
    };

    // A pending job without pods is waiting whatever it asked for.
    if status == WorkloadStatus::Pending && pod_count == 0 {
        return GpuSummary::Waiting(descriptor);
    }
    if count == 0 {
        return GpuSummary::NoGpu;
    }
    GpuSummary::Assigned(descriptor)
}

#[cfg(test)]
mod tests {
    use super::{
        WorkloadCounts, derive_status, format_age, format_completions, format_duration,
        format_elapsed, gpu_model_selector, parse_gpu_quantity, summarize_gpu,
    };
    use crate::model::{GpuFamily, GpuMemory, GpuSummary, WorkloadStatus};

    fn counts(active: i32, succeeded: i32, failed: i32) -> WorkloadCounts {
        WorkloadCounts {
            active,
            succeeded,
            failed,
        }
    }

    #[test]
    fn status_precedence_follows_active_succeeded_failed() {
        assert_eq!(derive_status(counts(0, 0, 0)), WorkloadStatus::Pending);
        assert_eq!(derive_status(counts(1, 0, 0)), WorkloadStatus::Running);
        assert_eq!(derive_status(counts(1, 5, 3)), WorkloadStatus::Running);
        assert_eq!(derive_status(counts(0, 1, 3)), WorkloadStatus::Complete);
        assert_eq!(derive_status(counts(0, 0, 2)), WorkloadStatus::Failed);
    }

    #[test]
    fn completions_default_target_is_one() {
        assert_eq!(format_completions(0, None), "0/1");
        assert_eq!(format_completions(3, Some(4)), "3/4");
    }

    #[test]
    fn elapsed_drops_leading_zero_units() {
        assert_eq!(format_elapsed((25 * 60 + 3) * 60), "1d1h3m");
        assert_eq!(format_elapsed(45 * 60), "45m");
        assert_eq!(format_elapsed(2 * 3600), "2h0m");
        assert_eq!(format_elapsed(59), "0m");
        assert_eq!(format_elapsed(-300), "0m");
    }

    #[test]
    fn duration_uses_completion_or_now() {
        assert_eq!(format_duration(Some(0), Some(600), 99_999), "10m");
        assert_eq!(format_duration(Some(0), None, 3_660), "1h1m");
        assert_eq!(format_duration(None, Some(10), 20), "–");
        assert_eq!(format_age(None, 20), "–");
        assert_eq!(format_age(Some(100), 100 + 86_400), "1d0h0m");
    }

    #[test]
    fn node_selector_wins_over_affinity() {
        let selector = [("nvidia.com/gpu.product", "NVIDIA-H200")];
        let affinity = [("nvidia.com/gpu.product", "NVIDIA-A100-SXM4-80GB")];
        assert_eq!(
            gpu_model_selector(selector, affinity),
            Some("NVIDIA-H200".to_string())
        );
        assert_eq!(
            gpu_model_selector([("kubernetes.io/arch", "amd64")], affinity),
            Some("NVIDIA-A100-SXM4-80GB".to_string())
        );
        assert_eq!(gpu_model_selector([], []), None);
    }

    #[test]
    fn gpu_quantity_parses_plain_integers_only() {
        assert_eq!(parse_gpu_quantity(Some("2")), 2);
        assert_eq!(parse_gpu_quantity(Some(" 4 ")), 4);
        assert_eq!(parse_gpu_quantity(Some("abc")), 0);
        assert_eq!(parse_gpu_quantity(None), 0);
    }

    #[test]
    fn waiting_wins_over_zero_gpus() {
        let summary = summarize_gpu(
            0,
            Some("NVIDIA-A100-SXM4-80GB"),
            WorkloadStatus::Pending,
            0,
        );
        assert!(matches!(summary, GpuSummary::Waiting(_)));
        assert_eq!(summary.label(), "⏳ A100-80G");
    }

    #[test]
    fn zero_gpus_on_scheduled_job_is_no_gpu() {
        let running = summarize_gpu(
            0,
            Some("NVIDIA-A100-SXM4-80GB"),
            WorkloadStatus::Running,
            1,
        );
        assert_eq!(running, GpuSummary::NoGpu);
        let pending_with_pod = summarize_gpu(0, None, WorkloadStatus::Pending, 1);
        assert_eq!(pending_with_pod, GpuSummary::NoGpu);
    }

    #[test]
    fn family_and_memory_are_detected() {
        let GpuSummary::Assigned(descriptor) = summarize_gpu(
            1,
            Some("NVIDIA-A100-SXM4-40GB-MIG-3g.20gb"),
            WorkloadStatus::Running,
            1,
        ) else {
            panic!("expected assigned summary");
        };
        assert_eq!(descriptor.family, Some(GpuFamily::A100));
        assert_eq!(descriptor.memory, Some(GpuMemory::Gb40));

        let summary = summarize_gpu(1, Some("NVIDIA-H200"), WorkloadStatus::Running, 1);
        assert_eq!(summary.label(), "H200");
    }

    #[test]
    fn unknown_family_falls_back_to_count() {
        let summary = summarize_gpu(2, Some("Tesla-V100-32GB"), WorkloadStatus::Running, 2);
        assert_eq!(summary.label(), "2 GPU");
        let summary = summarize_gpu(1, None, WorkloadStatus::Complete, 1);
        assert_eq!(summary.label(), "1 GPU");
    }

    #[test]
    fn pending_without_pods_is_waiting() {
        let summary = summarize_gpu(
            4,
            Some("NVIDIA-H100-80GB-HBM3"),
            WorkloadStatus::Pending,
            0,
        );
        assert!(matches!(summary, GpuSummary::Waiting(_)));
        assert_eq!(summary.label(), "⏳ H100-80G");

        let scheduled = summarize_gpu(
            4,
            Some("NVIDIA-H100-80GB-HBM3"),
            WorkloadStatus::Pending,
            1,
        );
        assert!(!matches!(scheduled, GpuSummary::Waiting(_)));
    }
}
