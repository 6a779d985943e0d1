use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, Config, ResourceExt};
use std::future::Future;
use tokio::time::{Duration, timeout};
use tracing::debug;

const FIELD_MANAGER: &str = "jobdeck";

/// Cluster operations the dashboard depends on, bound to one namespace.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    fn namespace(&self) -> &str;

    async fn list_jobs(&self) -> Result<Vec<Job>>;

    async fn list_pods(&self) -> Result<Vec<Pod>>;

    async fn get_job(&self, name: &str) -> Result<Job>;

    /// Deletes the job and waits for dependents to be collected first.
    async fn delete_job(&self, name: &str) -> Result<()>;

    /// Server-side applies one document and returns `Kind/name` of the result.
    async fn apply_document(&self, document: &serde_yaml::Value) -> Result<String>;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    context: String,
    namespace: String,
    timeout: Duration,
}

impl KubeCluster {
    pub async fn connect(namespace: Option<String>, call_timeout: Duration) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            Config::from_custom_kubeconfig(kubeconfig_value, &KubeConfigOptions::default())
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let namespace = namespace
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| config.default_namespace.clone());
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = kubeconfig
            .and_then(|cfg| cfg.current_context)
            .unwrap_or_else(|| "in-cluster".to_string());

        debug!("connected to context {context}, namespace {namespace}");
        Ok(Self {
            client,
            context,
            namespace,
            timeout: call_timeout,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = kube::Result<T>> + Send,
    {
        match timeout(self.timeout, call).await {
            Ok(result) => result.with_context(|| format!("{what} failed")),
            Err(_) => bail!("{what} timed out after {}s", self.timeout.as_secs()),
        }
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs();
        let list = self
            .bounded("listing jobs", jobs.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = self
            .bounded("listing pods", pods.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        let jobs = self.jobs();
        self.bounded(&format!("reading job {name}"), jobs.get(name))
            .await
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        let jobs = self.jobs();
        let params = DeleteParams::foreground();
        self.bounded(&format!("deleting job {name}"), jobs.delete(name, &params))
            .await?;
        Ok(())
    }

    async fn apply_document(&self, document: &serde_yaml::Value) -> Result<String> {
        let object: DynamicObject = serde_yaml::from_value(document.clone())
            .context("document is not a Kubernetes object")?;
        let resource = api_resource(&object)?;
        let namespace = object
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| self.namespace.clone());
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, &resource);

        let applied = match object.metadata.name.clone() {
            Some(name) => {
                let params = PatchParams::apply(FIELD_MANAGER).force();
                self.bounded(
                    &format!("applying {} {name}", resource.kind),
                    api.patch(&name, &params, &Patch::Apply(&object)),
                )
                .await?
            }
            None if object.metadata.generate_name.is_some() => {
                self.bounded(
                    &format!("creating {}", resource.kind),
                    api.create(&PostParams::default(), &object),
                )
                .await?
            }
            None => bail!("{} document has neither name nor generateName", resource.kind),
        };

        Ok(format!("{}/{}", resource.kind, applied.name_any()))
    }
}

fn api_resource(object: &DynamicObject) -> Result<ApiResource> {
    let Some(types) = object.types.as_ref() else {
        bail!("document is missing apiVersion or kind");
    };
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    let gvk = GroupVersionKind::gvk(group, version, &types.kind);
    Ok(ApiResource::from_gvk(&gvk))
}

#[cfg(test)]
mod tests {
    use super::api_resource;
    use kube::core::DynamicObject;

    fn object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).expect("dynamic object")
    }

    #[test]
    fn core_group_documents_resolve_without_group() {
        let resource = api_resource(&object(serde_json::json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "scratch"}
        })))
        .expect("resource");
        assert_eq!(resource.group, "");
        assert_eq!(resource.version, "v1");
        assert_eq!(resource.plural, "persistentvolumeclaims");
    }

    #[test]
    fn grouped_documents_split_api_version() {
        let resource = api_resource(&object(serde_json::json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {"generateName": "train-"}
        })))
        .expect("resource");
        assert_eq!(resource.group, "batch");
        assert_eq!(resource.version, "v1");
        assert_eq!(resource.plural, "jobs");
        assert_eq!(resource.api_version, "batch/v1");
    }

    #[test]
    fn untyped_documents_are_rejected() {
        let untyped = object(serde_json::json!({"metadata": {"name": "x"}}));
        assert!(api_resource(&untyped).is_err());
    }
}
