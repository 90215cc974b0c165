//! End-to-end scenarios over a loopback channel pair.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pluglink_codec::{PlainValue, ResponseError, RpcValue, Uri};
use pluglink_mux::Channel;
use pluglink_rpc::{method_not_found, RpcError, RpcProtocol, RpcService};

struct CalculatorService;

#[async_trait]
impl RpcService for CalculatorService {
    async fn invoke(
        &self,
        method: &str,
        args: Vec<RpcValue>,
    ) -> Result<RpcValue, ResponseError> {
        match method {
            "add" => {
                let sum: i64 = args.iter().filter_map(RpcValue::as_i64).sum();
                Ok(RpcValue::json(sum))
            }
            "alwaysBusy" => Err(ResponseError::new(7, "busy")),
            other => Err(method_not_found(other)),
        }
    }
}

#[derive(Default)]
struct RecordingService {
    notifications: Mutex<Vec<(String, Vec<RpcValue>)>>,
    disposed: Mutex<bool>,
}

#[async_trait]
impl RpcService for RecordingService {
    async fn invoke(
        &self,
        _method: &str,
        args: Vec<RpcValue>,
    ) -> Result<RpcValue, ResponseError> {
        // Echo the first argument back.
        Ok(args.into_iter().next().unwrap_or(RpcValue::Undefined))
    }

    fn notify(&self, method: &str, args: Vec<RpcValue>) {
        self.notifications
            .lock()
            .unwrap()
            .push((method.to_string(), args));
    }

    fn dispose(&self) {
        *self.disposed.lock().unwrap() = true;
    }
}

fn endpoint_pair() -> (RpcProtocol, RpcProtocol) {
    let (host_channel, plugin_channel) = Channel::pipe();
    (
        RpcProtocol::new(host_channel),
        RpcProtocol::new(plugin_channel),
    )
}

#[tokio::test]
async fn request_travels_host_to_plugin_and_back() {
    let (host, plugin) = endpoint_pair();
    plugin.set("calculator", Arc::new(CalculatorService)).unwrap();

    let proxy = host.get_proxy("calculator").unwrap();
    let reply = proxy
        .request("add", vec![RpcValue::json(2i64), RpcValue::json(3i64)])
        .await
        .unwrap();
    assert_eq!(reply.as_i64(), Some(5));
}

#[tokio::test]
async fn handler_rejection_comes_back_as_response_error() {
    let (host, plugin) = endpoint_pair();
    plugin.set("calculator", Arc::new(CalculatorService)).unwrap();

    let proxy = host.get_proxy("calculator").unwrap();
    match proxy.request("alwaysBusy", vec![]).await.unwrap_err() {
        RpcError::Response(err) => {
            assert_eq!(err.code, 7);
            assert_eq!(err.message, "busy");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The connection survives a rejected request.
    let reply = proxy.request("add", vec![RpcValue::json(1i64)]).await.unwrap();
    assert_eq!(reply.as_i64(), Some(1));
}

#[tokio::test]
async fn notifications_are_fire_and_forget() {
    let (host, plugin) = endpoint_pair();
    let recorder = Arc::new(RecordingService::default());
    plugin.set("editor", recorder.clone() as Arc<dyn RpcService>).unwrap();

    let proxy = host.get_proxy("editor").unwrap();
    let returned = proxy
        .call("onDidSave", vec![RpcValue::json("file.txt")])
        .await
        .unwrap();
    assert!(matches!(returned, RpcValue::Undefined));

    // A request behind the notification confirms it was delivered first.
    proxy.request("echo", vec![]).await.unwrap();
    let seen = recorder.notifications.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "onDidSave");
}

#[tokio::test]
async fn composite_values_survive_the_trip() {
    let (host, plugin) = endpoint_pair();
    plugin.set("echo", Arc::new(RecordingService::default()) as Arc<dyn RpcService>).unwrap();

    let proxy = host.get_proxy("echo").unwrap();
    let uri = PlainValue::Uri(Uri::new("file:///tmp/a.rs"));
    let reply = proxy
        .request("echo", vec![RpcValue::json(uri.clone())])
        .await
        .unwrap();
    assert_eq!(reply.as_json(), Some(&uri));

    let buffer = RpcValue::Buffer(bytes::Bytes::from_static(b"\x00\x01raw"));
    let reply = proxy.request("echo", vec![buffer]).await.unwrap();
    match reply {
        RpcValue::Buffer(bytes) => assert_eq!(bytes.as_ref(), b"\x00\x01raw"),
        other => panic!("unexpected value: {other:?}"),
    }
}

#[tokio::test]
async fn first_service_binding_wins() {
    let (_host, plugin) = endpoint_pair();
    let first = Arc::new(RecordingService::default());
    let bound = plugin.set("svc", first.clone() as Arc<dyn RpcService>).unwrap();
    assert!(Arc::ptr_eq(
        &bound,
        &(first.clone() as Arc<dyn RpcService>)
    ));

    let second = Arc::new(RecordingService::default()) as Arc<dyn RpcService>;
    let kept = plugin.set("svc", second).unwrap();
    // The original binding is returned, not the new one.
    assert!(Arc::ptr_eq(&kept, &(first as Arc<dyn RpcService>)));
}

#[tokio::test]
async fn service_bound_after_peer_opens_still_connects() {
    let (host, plugin) = endpoint_pair();
    let proxy = host.get_proxy("late").unwrap();

    let request = tokio::spawn({
        let proxy = proxy.clone();
        async move { proxy.request("echo", vec![RpcValue::json(42i64)]).await }
    });
    // Give the open handshake time to land before the service exists.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    plugin.set("late", Arc::new(RecordingService::default()) as Arc<dyn RpcService>).unwrap();
    let reply = request.await.unwrap().unwrap();
    assert_eq!(reply.as_i64(), Some(42));
}

#[tokio::test]
async fn dispose_tears_everything_down() {
    let (host, plugin) = endpoint_pair();
    let recorder = Arc::new(RecordingService::default());
    plugin.set("svc", recorder.clone() as Arc<dyn RpcService>).unwrap();

    let proxy = host.get_proxy("svc").unwrap();
    proxy.request("echo", vec![]).await.unwrap();

    plugin.dispose();
    plugin.dispose(); // idempotent
    assert!(plugin.is_disposed());
    assert!(*recorder.disposed.lock().unwrap());

    // The host side observes the closed connection.
    let err = proxy.request("echo", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));

    host.dispose();
    assert!(host.is_disposed());
}

#[tokio::test]
async fn disposed_endpoint_refuses_new_proxies_and_bindings() {
    let (host, plugin) = endpoint_pair();
    plugin.dispose();

    assert!(matches!(
        plugin.get_proxy("svc").unwrap_err(),
        RpcError::ConnectionClosed
    ));
    let err = plugin
        .set(
            "svc",
            Arc::new(RecordingService::default()) as Arc<dyn RpcService>,
        )
        .unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));
    // The binding was refused, not silently recorded.
    assert!(!plugin.has_local("svc"));

    host.dispose();
    assert!(matches!(
        host.get_proxy("svc").unwrap_err(),
        RpcError::ConnectionClosed
    ));
}

#[tokio::test]
async fn two_services_share_one_physical_channel() {
    let (host, plugin) = endpoint_pair();
    plugin.set("calculator", Arc::new(CalculatorService)).unwrap();
    plugin
        .set(
            "editor",
            Arc::new(RecordingService::default()) as Arc<dyn RpcService>,
        )
        .unwrap();

    let calculator = host.get_proxy("calculator").unwrap();
    let editor = host.get_proxy("editor").unwrap();

    let (sum, echoed) = tokio::join!(
        calculator.request("add", vec![RpcValue::json(4i64), RpcValue::json(6i64)]),
        editor.request("echo", vec![RpcValue::json("hello")]),
    );
    assert_eq!(sum.unwrap().as_i64(), Some(10));
    assert_eq!(
        echoed.unwrap().as_json(),
        Some(&PlainValue::String("hello".into()))
    );
}
