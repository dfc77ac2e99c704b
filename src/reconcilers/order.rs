//! Deployment ordering for target objects
//!
//! Objects that others depend on (namespaces, CRDs, service accounts, RBAC,
//! configuration) are applied before the workloads that consume them. This is
//! a priority table, not a dependency graph: cross-references between objects
//! are never inspected.

use crate::manifest::Object;

/// Priority of an object in the default deployment order; lower goes first
///
/// Unlisted kinds get 0 and keep their relative position, since the sort in
/// [`crate::manifest::Objects::sort`] is stable.
pub fn default_object_order(o: &Object) -> i32 {
    match (o.group(), o.kind()) {
        // CRDs are slow to establish and instances usually follow
        ("apiextensions.k8s.io", "CustomResourceDefinition") => -1000,
        ("", "Namespace") => -900,

        // Accounts and roles exist before anything binds them
        ("", "ServiceAccount")
        | ("rbac.authorization.k8s.io", "ClusterRole")
        | ("rbac.authorization.k8s.io", "Role") => 1,
        ("rbac.authorization.k8s.io", "ClusterRoleBinding")
        | ("rbac.authorization.k8s.io", "RoleBinding") => 2,

        // Pods mount these; creating them first avoids crash-loop backoff
        ("", "ConfigMap") | ("", "Secret") => 100,

        ("", "Service") => 500,

        ("apps" | "extensions", "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet")
        | ("batch", "Job" | "CronJob") => 1000,

        // Autoscalers act on workloads
        ("autoscaling", "HorizontalPodAutoscaler") => 1001,

        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Objects;
    use serde_json::json;

    fn object(api_version: &str, kind: &str, name: &str) -> Object {
        Object::from_value(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": name }
        }))
        .unwrap()
    }

    fn names(objects: &Objects) -> Vec<String> {
        objects
            .items
            .iter()
            .map(|o| format!("{}/{}", o.kind(), o.name()))
            .collect()
    }

    #[test]
    fn test_namespace_before_service_account_before_deployment() {
        let mut objects = Objects {
            items: vec![
                object("apps/v1", "Deployment", "web"),
                object("v1", "Namespace", "demo"),
                object("v1", "ServiceAccount", "web"),
            ],
            ..Default::default()
        };

        objects.sort(default_object_order);

        assert_eq!(
            names(&objects),
            vec!["Namespace/demo", "ServiceAccount/web", "Deployment/web"]
        );
    }

    #[test]
    fn test_equal_priority_keeps_input_order() {
        let mut objects = Objects {
            items: vec![
                object("apps/v1", "Deployment", "b"),
                object("v1", "ConfigMap", "z"),
                object("apps/v1", "Deployment", "a"),
                object("v1", "ConfigMap", "y"),
                object("example.com/v1", "Widget", "w2"),
                object("example.com/v1", "Widget", "w1"),
            ],
            ..Default::default()
        };

        objects.sort(default_object_order);

        assert_eq!(
            names(&objects),
            vec![
                "Widget/w2",
                "Widget/w1",
                "ConfigMap/z",
                "ConfigMap/y",
                "Deployment/b",
                "Deployment/a",
            ]
        );
    }

    #[test]
    fn test_full_table() {
        let mut objects = Objects {
            items: vec![
                object("autoscaling/v2", "HorizontalPodAutoscaler", "hpa"),
                object("v1", "Service", "svc"),
                object("apps/v1", "Deployment", "web"),
                object("v1", "Secret", "creds"),
                object("rbac.authorization.k8s.io/v1", "RoleBinding", "rb"),
                object("rbac.authorization.k8s.io/v1", "Role", "r"),
                object("v1", "Namespace", "ns"),
                object("apiextensions.k8s.io/v1", "CustomResourceDefinition", "crd"),
            ],
            ..Default::default()
        };

        objects.sort(default_object_order);

        assert_eq!(
            names(&objects),
            vec![
                "CustomResourceDefinition/crd",
                "Namespace/ns",
                "Role/r",
                "RoleBinding/rb",
                "Secret/creds",
                "Service/svc",
                "Deployment/web",
                "HorizontalPodAutoscaler/hpa",
            ]
        );
    }

    #[test]
    fn test_kind_match_is_group_aware() {
        // A namespaced CRD kind named like a core kind is not a core kind
        let custom = object("example.com/v1", "Namespace", "fake");
        assert_eq!(default_object_order(&custom), 0);
    }
}
