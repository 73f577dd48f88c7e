//! 在售列表响应关联 - 服务层
//!
//! 被动监听浏览器会话中的在售列表查询响应，从中提取 `{platformId, title}`，
//! 按标题记录第一次出现的平台编号。响应相对于触发它的操作是异步到达的，
//! 调用方先 `reset()`，再触发查询（通常是刷新页面），然后 `wait_ready()` 等待。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct BindingCorrelator {
    bindings: Mutex<HashMap<String, String>>,
    ready: watch::Sender<bool>,
}

impl BindingCorrelator {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            bindings: Mutex::new(HashMap::new()),
            ready,
        }
    }

    /// 清除就绪标志（已记录的绑定保留）
    pub fn reset(&self) {
        self.ready.send_replace(false);
    }

    /// 自上次 reset 以来是否收到过有效响应
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// 按标题查找平台编号
    pub fn lookup(&self, title: &str) -> Option<String> {
        match self.bindings.lock() {
            Ok(bindings) => bindings.get(title).cloned(),
            Err(poisoned) => poisoned.into_inner().get(title).cloned(),
        }
    }

    /// 已记录的绑定数量
    pub fn len(&self) -> usize {
        match self.bindings.lock() {
            Ok(bindings) => bindings.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 处理一个已解析的响应，返回新记录的绑定数量
    ///
    /// 响应结构：`data.viewer.selling_feed_one_page.edges[].node.{id, group_commerce_item_title}`。
    /// 不符合该结构的响应被忽略，不会置为就绪。
    pub fn ingest(&self, payload: &JsonValue) -> usize {
        let Some(edges) = payload
            .pointer("/data/viewer/selling_feed_one_page/edges")
            .and_then(|edges| edges.as_array())
        else {
            debug!("响应不包含在售列表，忽略");
            return 0;
        };

        let mut added = 0;
        {
            let mut bindings = match self.bindings.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for node in edges.iter().filter_map(|edge| edge.get("node")) {
                let id = node.get("id").and_then(|v| v.as_str());
                let title = node
                    .get("group_commerce_item_title")
                    .and_then(|v| v.as_str());
                let (Some(id), Some(title)) = (id, title) else {
                    continue;
                };
                if !bindings.contains_key(title) {
                    debug!("在售商品: \"{}\" => {}", title, id);
                    bindings.insert(title.to_string(), id.to_string());
                    added += 1;
                }
            }
        }

        self.ready.send_replace(true);
        added
    }

    /// 处理原始响应文本
    ///
    /// 响应可能是单个 JSON，也可能是按行分隔的多个 JSON。
    pub fn ingest_body(&self, body: &str) -> Result<usize> {
        if let Ok(payload) = serde_json::from_str::<JsonValue>(body) {
            return Ok(self.ingest(&payload));
        }

        let mut parsed_any = false;
        let mut added = 0;
        for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match serde_json::from_str::<JsonValue>(line) {
                Ok(payload) => {
                    parsed_any = true;
                    added += self.ingest(&payload);
                }
                Err(e) => warn!("⚠️ 无法解析在售列表响应的一行: {}", e),
            }
        }

        if parsed_any {
            Ok(added)
        } else {
            Err(anyhow!("在售列表响应不是有效的 JSON"))
        }
    }

    /// 等待就绪，最多等待 `delay × iterations`
    pub async fn wait_ready(&self, delay: Duration, iterations: u32) -> bool {
        let mut ready = self.ready.subscribe();
        let budget = delay.saturating_mul(iterations);
        let received = tokio::time::timeout(budget, ready.wait_for(|ready| *ready))
            .await
            .map(|result| result.is_ok());
        received.unwrap_or(false)
    }
}

impl Default for BindingCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn feed(items: &[(&str, &str)]) -> JsonValue {
        let edges: Vec<JsonValue> = items
            .iter()
            .map(|(id, title)| json!({ "node": { "id": id, "group_commerce_item_title": title } }))
            .collect();
        json!({ "data": { "viewer": { "selling_feed_one_page": { "edges": edges } } } })
    }

    #[test]
    fn test_first_seen_binding_wins() {
        let correlator = BindingCorrelator::new();
        assert!(!correlator.is_ready());
        assert_eq!(correlator.lookup("MAISON [123]"), None);

        assert_eq!(correlator.ingest(&feed(&[("999", "MAISON [123]")])), 1);
        assert!(correlator.is_ready());
        assert_eq!(correlator.lookup("MAISON [123]").as_deref(), Some("999"));

        assert_eq!(correlator.ingest(&feed(&[("111", "MAISON [123]")])), 0);
        assert_eq!(
            correlator.lookup("MAISON [123]").as_deref(),
            Some("999"),
            "后到的重复标题不应覆盖已有绑定"
        );
    }

    #[test]
    fn test_unrelated_payload_is_ignored() {
        let correlator = BindingCorrelator::new();
        assert_eq!(correlator.ingest(&json!({ "data": { "me": {} } })), 0);
        assert!(!correlator.is_ready());
    }

    #[test]
    fn test_ingest_body_with_multiple_lines() {
        let correlator = BindingCorrelator::new();
        let body = format!(
            "{}\n{}\n",
            feed(&[("1", "A")]),
            json!({ "extensions": { "is_final": true } })
        );
        assert_eq!(correlator.ingest_body(&body).unwrap(), 1);
        assert_eq!(correlator.lookup("A").as_deref(), Some("1"));
        assert!(correlator.ingest_body("<html>").is_err());
    }

    #[tokio::test]
    async fn test_reset_keeps_bindings_and_wait_ready() {
        let correlator = Arc::new(BindingCorrelator::new());
        correlator.ingest(&feed(&[("1", "A")]));
        correlator.reset();
        assert!(!correlator.is_ready());
        assert_eq!(correlator.lookup("A").as_deref(), Some("1"));

        let background = Arc::clone(&correlator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            background.ingest(&feed(&[("2", "B")]));
        });
        assert!(correlator.wait_ready(Duration::from_millis(50), 10).await);
        assert_eq!(correlator.lookup("B").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out() {
        let correlator = BindingCorrelator::new();
        assert!(!correlator.wait_ready(Duration::from_millis(5), 2).await);
    }
}
