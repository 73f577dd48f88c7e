mod common;

use std::sync::Arc;

use marketplace_sync::error::{is_session_failure, ActionError};
use marketplace_sync::services::{ActionDriver, FailureReason, ManageAction, MarketplaceSeller};

use common::{listing, selling_feed, test_config, FakeUiDriver};

#[tokio::test]
async fn test_form_retry_captures_each_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();
    state.lock().unwrap().type_failures = 2;

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let result = seller.sell(&listing("123", "MAISON [123]")).await.unwrap();

    assert!(result.success, "第三次尝试应该成功");
    let state = state.lock().unwrap();
    assert_eq!(state.screenshots, 2, "每次失败截图一次");
    assert!(state
        .clicks
        .iter()
        .any(|selector| selector == &config.selectors.modal_cancel));
}

#[tokio::test]
async fn test_form_retry_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();
    state.lock().unwrap().type_failures = 10;

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let err = seller
        .sell(&listing("123", "MAISON [123]"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ActionError>(),
        Some(ActionError::Terminal { attempts: 3, .. })
    ));
    assert!(!is_session_failure(&err));
    assert_eq!(state.lock().unwrap().screenshots, 3, "截图次数不超过最大尝试次数");
}

#[tokio::test]
async fn test_dry_run_discards_form() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let item = listing("123", "MAISON [123]");
    let result = seller.sell(&item).await.unwrap();
    assert!(result.success);

    let state = state.lock().unwrap();
    let s = &config.selectors;
    assert!(state.clicks.contains(&s.discard_confirm));
    assert!(!state.clicks.contains(&s.submit_button), "试运行不应提交");
    assert_eq!(state.reloads, 0);
    assert!(state
        .typed
        .contains(&(s.form_title.clone(), "MAISON [123]".to_string())));
    assert_eq!(state.attached.len(), item.pictures.len());
}

#[tokio::test]
async fn test_commit_sell_binds_platform_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.commit = true;
    let (driver, state) = FakeUiDriver::new();
    {
        let mut state = state.lock().unwrap();
        state.feed_on_reload = Some(selling_feed(&[("999", "MAISON [123]")]));
        state
            .texts
            .insert(config.selectors.submit_button.clone(), "Next".into());
    }

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    assert_eq!(seller.platform_id_for("MAISON [123]"), None);

    let result = seller.sell(&listing("123", "MAISON [123]")).await.unwrap();
    assert!(result.success);
    assert_eq!(seller.platform_id_for("MAISON [123]").as_deref(), Some("999"));

    let state = state.lock().unwrap();
    let submits = state
        .clicks
        .iter()
        .filter(|selector| *selector == &config.selectors.submit_button)
        .count();
    assert_eq!(submits, 2, "先点击 Next 再提交");
    assert_eq!(state.reloads, 1);
}

#[tokio::test]
async fn test_commit_sell_without_feed_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.commit = true;
    config.retry.binding_reloads = 2;
    let (driver, state) = FakeUiDriver::new();

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let err = seller
        .sell(&listing("123", "MAISON [123]"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ActionError>(),
        Some(ActionError::BindingTimeout { .. })
    ));
    let state = state.lock().unwrap();
    assert_eq!(state.reloads, 2);
    assert_eq!(state.screenshots, 1);
}

#[tokio::test]
async fn test_commit_sell_missing_from_feed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.commit = true;
    let (driver, state) = FakeUiDriver::new();
    state.lock().unwrap().feed_on_reload = Some(selling_feed(&[("111", "AUTRE [111]")]));

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let err = seller
        .sell(&listing("123", "MAISON [123]"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ActionError>(),
        Some(ActionError::NotListed { .. })
    ));
    assert_eq!(seller.platform_id_for("AUTRE [111]").as_deref(), Some("111"));
}

#[tokio::test]
async fn test_manage_not_found_returns_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let result = seller
        .manage(&listing("123", "MAISON [123]"), ManageAction::Remove)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_reason, Some(FailureReason::AdNotFound));
    assert!(result.diagnostic_artifact.is_some(), "找不到商品时应保存截图");
    assert_eq!(state.lock().unwrap().screenshots, 1);
}

#[tokio::test]
async fn test_edit_locates_ad_by_old_title() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();
    state.lock().unwrap().listed_titles = vec!["OLD".into()];

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let mut item = listing("123", "NEW");
    item.old_title = Some("OLD".into());
    let result = seller.manage(&item, ManageAction::Edit).await.unwrap();

    assert!(result.success);
    let state = state.lock().unwrap();
    let s = &config.selectors;
    assert!(state.clicks.contains(&"[data-sync-target=\"1\"]".to_string()));
    assert!(state.clicks.contains(&s.menu_edit));
    assert!(state.typed.contains(&(s.form_title.clone(), "NEW".to_string())));
}

#[tokio::test]
async fn test_edit_retry_reopens_ad_menu() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();
    {
        let mut state = state.lock().unwrap();
        state.listed_titles = vec!["OLD".into()];
        state.type_failures = 1;
    }

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let mut item = listing("123", "NEW");
    item.old_title = Some("OLD".into());
    let result = seller.manage(&item, ManageAction::Edit).await.unwrap();

    assert!(result.success, "第二次尝试应该成功");
    let state = state.lock().unwrap();
    let s = &config.selectors;
    let count = |selector: &str| state.clicks.iter().filter(|c| *c == selector).count();
    assert_eq!(count("[data-sync-target=\"1\"]"), 2, "每次尝试前都要打开操作菜单");
    assert_eq!(count(&s.menu_edit), 2);
    // 一次是失败后关闭表单，一次是试运行放弃表单
    assert_eq!(count(&s.modal_cancel), 2);
    assert_eq!(state.screenshots, 1);
    assert!(state.typed.contains(&(s.form_title.clone(), "NEW".to_string())));
}

#[tokio::test]
async fn test_remove_confirms_only_in_commit_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.commit = true;
    let (driver, state) = FakeUiDriver::new();
    state.lock().unwrap().listed_titles = vec!["MAISON [123]".into()];

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    let result = seller
        .manage(&listing("123", "MAISON [123]"), ManageAction::Remove)
        .await
        .unwrap();

    assert!(result.success);
    let state = state.lock().unwrap();
    assert!(state.clicks.contains(&config.selectors.remove_confirm));
    assert!(!state.clicks.contains(&config.selectors.remove_cancel));
}

#[tokio::test]
async fn test_login_when_form_present() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();
    state
        .lock()
        .unwrap()
        .present
        .insert(config.selectors.login_form.clone());

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();

    let state = state.lock().unwrap();
    assert!(state
        .typed
        .contains(&(config.selectors.login_email.clone(), config.login.clone())));
    assert!(state.clicks.contains(&config.selectors.login_button));
}

#[tokio::test]
async fn test_login_failure_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();
    {
        let mut state = state.lock().unwrap();
        state.present.insert(config.selectors.login_form.clone());
        state.present.insert(config.selectors.login_button.clone());
    }

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    let err = seller.open().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ActionError>(),
        Some(ActionError::LoginFailed { attempts: 2 })
    ));
    let state = state.lock().unwrap();
    let logins = state
        .clicks
        .iter()
        .filter(|selector| *selector == &config.selectors.login_button)
        .count();
    assert_eq!(logins, 2);
}

#[tokio::test]
async fn test_crash_is_session_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, state) = FakeUiDriver::new();

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    seller.open().await.unwrap();
    state.lock().unwrap().crashed = true;

    let err = seller
        .sell(&listing("123", "MAISON [123]"))
        .await
        .unwrap_err();
    assert!(is_session_failure(&err), "页面崩溃应触发会话重启");
    assert_eq!(state.lock().unwrap().screenshots, 0);

    seller.close().await.unwrap();
    assert_eq!(state.lock().unwrap().sessions_closed, 1);
}

#[tokio::test]
async fn test_action_without_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (driver, _state) = FakeUiDriver::new();

    let mut seller = MarketplaceSeller::new(&config, Arc::new(driver));
    let err = seller
        .sell(&listing("123", "MAISON [123]"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ActionError>(),
        Some(ActionError::NoSession)
    ));
}
