pub mod destination;
pub mod error;
pub mod layer;

pub use destination::Destination;
pub use error::RouterError;
pub use layer::{IsolationLayer, IsolationService};

use std::sync::Arc;

use crate::services::identity::{LocalInstanceIdentity, carries_suffix, isolated_service_name};
use crate::services::policy::IsolationPolicy;
use crate::services::presence::PresenceSource;

// 注册表查询后的选择结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiblingChoice {
    Shared,
    Isolated,
}

#[derive(Debug)]
struct ResolverContext {
    policy: Arc<IsolationPolicy>,
    identity: Arc<LocalInstanceIdentity>,
    presence: Arc<dyn PresenceSource>,
}

/// 路由决策：每次出站调用前计算最终目标地址。
///
/// 策略检查全部在内存中完成，只有无法由策略决定时才查询实例注册表。
#[derive(Debug)]
pub struct RouteResolver {
    // 未启用隔离时为 None
    context: Option<ResolverContext>,
}

impl RouteResolver {
    /// `profiles` 为当前进程的环境标签，未命中启用环境时不做任何改写
    pub fn new<S: AsRef<str>>(
        policy: Arc<IsolationPolicy>,
        identity: Arc<LocalInstanceIdentity>,
        presence: Arc<dyn PresenceSource>,
        profiles: &[S],
    ) -> Self {
        if !policy.is_activated_by(profiles) {
            return Self::inactive();
        }
        Self {
            context: Some(ResolverContext {
                policy,
                identity,
                presence,
            }),
        }
    }

    /// 不启用隔离，`resolve` 原样返回
    pub fn inactive() -> Self {
        Self { context: None }
    }

    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    pub async fn resolve(&self, url: &str) -> Result<String, RouterError> {
        let Some(ctx) = &self.context else {
            return Ok(url.to_string());
        };

        // 默认环境不隔离
        let local_address = ctx.identity.address();
        if ctx.policy.is_default_address(local_address) {
            return Ok(url.to_string());
        }

        // 不是指定服务标识的地址不隔离
        if !ctx.policy.is_eligible(url) {
            return Ok(url.to_string());
        }

        let destination = Destination::parse(url)?;
        let service = destination.service();
        let suffix = ctx.identity.isolation_suffix();

        // 已改写过的地址不再追加后缀
        if destination.is_isolated_for(suffix) {
            return Ok(url.to_string());
        }

        if ctx.policy.requires_forced_isolation(local_address) {
            if ctx.policy.skips_isolation(service) {
                tracing::debug!(service_name = %service, "Forced isolation skipped for service");
                return Ok(url.to_string());
            }
            let rewritten = destination.with_suffix(suffix)?;
            tracing::debug!(from = %url, to = %rewritten, "Forced isolation rewrite");
            return Ok(rewritten);
        }

        let instances = ctx.presence.list_instances(service, suffix).await?;
        match choose_sibling(service, suffix, &instances)? {
            SiblingChoice::Isolated => {
                let rewritten = destination.with_suffix(suffix)?;
                tracing::debug!(
                    from = %url,
                    to = %rewritten,
                    instance_count = instances.len(),
                    "Routing to isolated sibling"
                );
                Ok(rewritten)
            }
            SiblingChoice::Shared => Ok(url.to_string()),
        }
    }
}

// 只有名称恰好为 `service-suffix` 的实例才算隔离实例；
// 没有精确匹配而多个实例以 `-suffix` 结尾时视为歧义
fn choose_sibling(
    service: &str,
    suffix: &str,
    instances: &[String],
) -> Result<SiblingChoice, RouterError> {
    if instances.is_empty() {
        return Err(RouterError::DestinationUnresolved {
            service: service.to_string(),
        });
    }
    if instances.len() == 1 {
        return Ok(SiblingChoice::Shared);
    }

    let sibling = isolated_service_name(service, suffix);
    if instances.iter().any(|instance| *instance == sibling) {
        return Ok(SiblingChoice::Isolated);
    }

    let candidates: Vec<String> = instances
        .iter()
        .filter(|instance| carries_suffix(instance, suffix))
        .cloned()
        .collect();
    if candidates.len() > 1 {
        return Err(RouterError::AmbiguousSibling {
            service: service.to_string(),
            candidates,
        });
    }
    Ok(SiblingChoice::Shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn test_choose_sibling() {
        assert!(matches!(
            choose_sibling("svc-orders", "10002", &[]),
            Err(RouterError::DestinationUnresolved { .. })
        ));
        assert_eq!(
            choose_sibling("svc-orders", "10002", &names(&["svc-orders-10002"])).unwrap(),
            SiblingChoice::Shared
        );
        assert_eq!(
            choose_sibling(
                "svc-orders",
                "10002",
                &names(&["svc-orders", "svc-orders-10002"])
            )
            .unwrap(),
            SiblingChoice::Isolated
        );
        assert_eq!(
            choose_sibling(
                "svc-orders",
                "10002",
                &names(&["svc-orders", "svc-orders-10003"])
            )
            .unwrap(),
            SiblingChoice::Shared
        );
    }

    #[test]
    fn test_exact_sibling_wins_over_lookalikes() {
        let instances = names(&[
            "svc-orders",
            "svc-orders-10002",
            "svc-orders-history-10002",
        ]);
        assert_eq!(
            choose_sibling("svc-orders", "10002", &instances).unwrap(),
            SiblingChoice::Isolated
        );
    }

    #[test]
    fn test_duplicate_suffix_without_exact_match_is_ambiguous() {
        let instances = names(&[
            "svc-orders",
            "svc-orders-v2-10002",
            "svc-orders-canary-10002",
        ]);
        assert!(matches!(
            choose_sibling("svc-orders", "10002", &instances),
            Err(RouterError::AmbiguousSibling { candidates, .. }) if candidates.len() == 2
        ));
    }

    #[test]
    fn test_neighbouring_suffixes_are_not_siblings() {
        let instances = names(&["svc-orders", "svc-orders-100021", "svc-orders-100022"]);
        assert_eq!(
            choose_sibling("svc-orders", "10002", &instances).unwrap(),
            SiblingChoice::Shared
        );
    }

    #[test]
    fn test_single_lookalike_sibling_stays_shared() {
        let instances = names(&["svc-orders", "svc-orders-canary-10002"]);
        assert_eq!(
            choose_sibling("svc-orders", "10002", &instances).unwrap(),
            SiblingChoice::Shared
        );
    }
}
