//! 网络响应监听
//!
//! 监听页面发出的在售列表查询，读取响应体交给 BindingCorrelator。
//! 响应头先到（ResponseReceived），响应体在 LoadingFinished 之后才能读取。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::inspector::{
    EnableParams as InspectorEnableParams, EventTargetCrashed,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::services::binding::BindingCorrelator;

/// 等待响应体的在售列表请求
///
/// 请求以 LoadingFinished 或 LoadingFailed 结束，两种情况都要移除。
#[derive(Debug, Default)]
struct PendingRequests {
    ids: HashSet<RequestId>,
}

impl PendingRequests {
    fn on_response(&mut self, url: &str, api_url: &str, id: &RequestId) {
        if url == api_url {
            self.ids.insert(id.clone());
        }
    }

    /// 返回该请求的响应体是否需要读取
    fn on_finished(&mut self, id: &RequestId) -> bool {
        self.ids.remove(id)
    }

    fn on_failed(&mut self, id: &RequestId) {
        if self.ids.remove(id) {
            debug!("在售列表请求加载失败: {:?}", id);
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// 启动在售列表响应监听
pub async fn spawn_selling_feed_listener(
    page: &Page,
    api_url: String,
    bindings: Arc<BindingCorrelator>,
) -> Result<JoinHandle<()>> {
    page.execute(EnableParams::default()).await?;
    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;
    let page = page.clone();

    Ok(tokio::spawn(async move {
        let mut pending = PendingRequests::default();
        loop {
            tokio::select! {
                Some(event) = responses.next() => {
                    pending.on_response(&event.response.url, &api_url, &event.request_id);
                }
                Some(event) = finished.next() => {
                    if pending.on_finished(&event.request_id) {
                        read_selling_feed(&page, event.request_id.clone(), &bindings).await;
                    }
                }
                Some(event) = failed.next() => {
                    pending.on_failed(&event.request_id);
                }
                else => break,
            }
        }
        debug!("网络响应监听已结束，{} 个请求未完成", pending.len());
    }))
}

async fn read_selling_feed(page: &Page, request_id: RequestId, bindings: &BindingCorrelator) {
    let response = match page.execute(GetResponseBodyParams::new(request_id)).await {
        Ok(response) => response,
        Err(e) => {
            error!("❌ 读取响应体失败: {}", e);
            return;
        }
    };
    if response.result.base64_encoded {
        debug!("忽略二进制响应");
        return;
    }

    match bindings.ingest_body(&response.result.body) {
        Ok(0) => debug!("响应中没有新的在售商品"),
        Ok(added) => info!("📋 收到在售列表，新增 {} 个商品", added),
        Err(e) => warn!("⚠️ 收到无效的 JSON: {}", e),
    }
}

/// 页面崩溃时置位 `crashed`
pub async fn spawn_crash_watch(page: &Page, crashed: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    page.execute(InspectorEnableParams::default()).await?;
    let mut events = page.event_listener::<EventTargetCrashed>().await?;
    Ok(tokio::spawn(async move {
        if events.next().await.is_some() {
            error!("❌ 页面已崩溃");
            crashed.store(true, Ordering::SeqCst);
        }
    }))
}
