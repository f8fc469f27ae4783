//! Wi-Fi provisioning and fallback through the command path, with the
//! keep-alive loop driven by synthetic timestamps.

use std::time::Duration;

use squaredose::app::commands::WifiConfigRequest;
use squaredose::app::{AppCommand, AppResponse};
use squaredose::wifi::WifiMode;

use crate::common::rig;

#[test]
fn fresh_device_boots_into_ap_with_derived_ssid() {
    let r = rig();

    match r.service.handle(AppCommand::GetWifiStatus).unwrap() {
        AppResponse::WifiStatus(status) => {
            assert_eq!(status.mode, WifiMode::Ap);
            assert!(status.ap_ssid.starts_with("SquareDose-"));
            assert_eq!(status.ip.unwrap().to_string(), "192.168.4.1");
        }
        other => panic!("expected WifiStatus, got {other:?}"),
    }

    match r.service.handle(AppCommand::GetStatus).unwrap() {
        AppResponse::Status(status) => {
            assert_eq!(status.wifi_mode, "AP");
            assert!(status.ap_ssid.starts_with("SquareDose-"));
        }
        other => panic!("{other:?}"),
    }
}

/// Configure credentials over the API while in AP mode; the response
/// returns first and the STA switch completes on a worker.
#[test]
fn configure_wifi_switches_to_sta_in_background() {
    let r = rig();

    let response = r
        .service
        .handle(AppCommand::ConfigureWifi(WifiConfigRequest {
            ssid: "Net".into(),
            password: "password1".into(),
        }))
        .unwrap();
    assert!(matches!(response, AppResponse::WifiConfigAccepted));

    assert!(
        r.wait_until(Duration::from_secs(5), || {
            r.wifi.current_mode() == WifiMode::Sta
        }),
        "worker should have switched to STA"
    );
    assert!(r.wifi.is_connected());
    assert_eq!(r.radio.current_ssid(), "Net");
    assert!(r.wifi.local_ip().is_some());

    match r.service.handle(AppCommand::GetWifiStatus).unwrap() {
        AppResponse::WifiStatus(status) => {
            assert_eq!(status.mode, WifiMode::Sta);
            assert!(status.connected);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn configure_wifi_rejects_bad_credentials_synchronously() {
    let r = rig();

    let err = r
        .service
        .handle(AppCommand::ConfigureWifi(WifiConfigRequest {
            ssid: String::new(),
            password: "password1".into(),
        }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    let err = r
        .service
        .handle(AppCommand::ConfigureWifi(WifiConfigRequest {
            ssid: "Net".into(),
            password: "short".into(),
        }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

/// Association loss, failed reconnects, then fallback to AP after the
/// 60 s threshold — with credentials intact and retries continuing.
#[test]
fn sta_loss_falls_back_to_ap_and_keeps_retrying() {
    let r = rig();
    r.wifi.set_credentials("Net", "password1").unwrap();
    r.wifi.switch_to_sta().unwrap();
    assert_eq!(r.wifi.current_mode(), WifiMode::Sta);

    // The link drops and both in-window reconnect attempts fail.
    r.radio.drop_sta();
    r.radio.script_connects([false, false]);

    r.wifi.keep_alive_step(10_000); // loss observed
    r.wifi.keep_alive_step(40_000); // still inside the window
    assert_eq!(r.wifi.current_mode(), WifiMode::Sta);

    r.wifi.keep_alive_step(70_001); // threshold crossed
    assert_eq!(r.wifi.current_mode(), WifiMode::Ap);
    assert!(r.radio.in_ap_mode());
    assert!(r.wifi.has_credentials(), "fallback must not erase credentials");

    // Retry cadence from AP: one attempt per 60 s interval.
    r.radio.script_connects([true]);
    r.wifi.keep_alive_step(100_000); // < 60 s since fallback attempt stamp
    assert_eq!(r.wifi.current_mode(), WifiMode::Ap);

    r.wifi.keep_alive_step(130_002); // due again — succeeds
    assert_eq!(r.wifi.current_mode(), WifiMode::Sta);
    assert!(r.wifi.is_connected());
}

#[test]
fn reset_wifi_clears_credentials_and_returns_to_ap() {
    let r = rig();
    r.service
        .handle(AppCommand::ConfigureWifi(WifiConfigRequest {
            ssid: "Net".into(),
            password: "password1".into(),
        }))
        .unwrap();
    assert!(r.wait_until(Duration::from_secs(5), || {
        r.wifi.current_mode() == WifiMode::Sta
    }));

    match r.service.handle(AppCommand::ResetWifi).unwrap() {
        AppResponse::WifiReset { ap_ssid } => {
            assert!(ap_ssid.starts_with("SquareDose-"));
        }
        other => panic!("expected WifiReset, got {other:?}"),
    }

    assert!(r.wait_until(Duration::from_secs(5), || {
        r.wifi.current_mode() == WifiMode::Ap
    }));
    assert!(!r.wifi.has_credentials());

    // With no credentials the keep-alive loop stays parked in AP.
    r.wifi.keep_alive_step(10_000_000);
    assert_eq!(r.wifi.current_mode(), WifiMode::Ap);
}
