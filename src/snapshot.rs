use anyhow::Result;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::ResourceExt;
use std::collections::HashMap;

use crate::k8s::ClusterClient;
use crate::model::WorkloadRecord;
use crate::summary::{
    GPU_RESOURCE, WorkloadCounts, derive_status, format_age, format_completions,
    format_duration, gpu_model_selector, parse_gpu_quantity, summarize_gpu,
};

const WORKLOAD_KIND: &str = "Job";

/// Fetches jobs and pods and folds them into view records. Either list call
/// failing fails the whole snapshot.
pub async fn build_snapshot(
    client: &dyn ClusterClient,
    owner_label: &str,
    now: i64,
) -> Result<Vec<WorkloadRecord>> {
    let jobs = client.list_jobs().await?;
    let pods = client.list_pods().await?;
    let by_owner = group_pods_by_owner(&pods);

    Ok(jobs
        .iter()
        .map(|job| {
            let owned = by_owner
                .get(job.name_any().as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            record_from_job(job, owned, owner_label, now)
        })
        .collect())
}

/// Name of the job that controls `pod`, if any.
fn controlling_job(pod: &Pod) -> Option<&str> {
    pod.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.controller == Some(true) && owner.kind == WORKLOAD_KIND)
        .map(|owner| owner.name.as_str())
}

pub fn group_pods_by_owner(pods: &[Pod]) -> HashMap<&str, Vec<&Pod>> {
    let mut grouped = HashMap::<&str, Vec<&Pod>>::new();
    for pod in pods {
        if let Some(owner) = controlling_job(pod) {
            grouped.entry(owner).or_default().push(pod);
        }
    }
    grouped
}

/// First pod of `job_name` currently in the Running phase.
pub fn running_pod_for(pods: &[Pod], job_name: &str) -> Option<String> {
    pods.iter()
        .filter(|pod| controlling_job(pod) == Some(job_name))
        .find(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                == Some("Running")
        })
        .map(|pod| pod.name_any())
}

pub fn record_from_job(
    job: &Job,
    pods: &[&Pod],
    owner_label: &str,
    now: i64,
) -> WorkloadRecord {
    let status = job.status.as_ref();
    let counts = WorkloadCounts {
        active: status.and_then(|status| status.active).unwrap_or(0),
        succeeded: status.and_then(|status| status.succeeded).unwrap_or(0),
        failed: status.and_then(|status| status.failed).unwrap_or(0),
    };
    let workload_status = derive_status(counts);

    let start = status
        .and_then(|status| status.start_time.as_ref())
        .map(|time| time.0.as_second());
    let completion = status
        .and_then(|status| status.completion_time.as_ref())
        .map(|time| time.0.as_second());
    let created = job
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|time| time.0.as_second());
    let target = job.spec.as_ref().and_then(|spec| spec.completions);

    let pod_spec = job
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref());
    let gpu_count = pod_spec.map(first_container_gpu_limit).unwrap_or(0);
    let model = pod_spec.and_then(gpu_model_for);

    WorkloadRecord {
        name: job.name_any(),
        owner: job.labels().get(owner_label).cloned(),
        status: workload_status,
        completions: format_completions(counts.succeeded, target),
        duration: format_duration(start, completion, now),
        age: format_age(created, now),
        pod_count: pods.len(),
        gpu_count,
        gpu: summarize_gpu(gpu_count, model.as_deref(), workload_status, pods.len()),
    }
}

fn first_container_gpu_limit(spec: &PodSpec) -> u32 {
    let quantity = spec
        .containers
        .first()
        .and_then(|container| container.resources.as_ref())
        .and_then(|resources| resources.limits.as_ref())
        .and_then(|limits| limits.get(GPU_RESOURCE))
        .map(|quantity| quantity.0.as_str());
    parse_gpu_quantity(quantity)
}

fn gpu_model_for(spec: &PodSpec) -> Option<String> {
    let node_selector = spec
        .node_selector
        .iter()
        .flatten()
        .map(|(key, value)| (key.as_str(), value.as_str()));

    let affinity = spec
        .affinity
        .as_ref()
        .and_then(|affinity| affinity.node_affinity.as_ref())
        .and_then(|node| {
            node.required_during_scheduling_ignored_during_execution
                .as_ref()
        })
        .map(|selector| selector.node_selector_terms.as_slice())
        .unwrap_or_default()
        .iter()
        .flat_map(|term| term.match_expressions.iter().flatten())
        .filter_map(|expression| {
            let value = expression.values.as_ref()?.first()?;
            Some((expression.key.as_str(), value.as_str()))
        });

    gpu_model_selector(node_selector, affinity)
}
