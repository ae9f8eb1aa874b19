// A client engine joining a hosting engine, both running in this process and talking over loopback.

mod support;

use backbone_lib::{MemoryStore, Mode, UiEvent, UiRequest};
use support::{LineClient, RunningEngine};

async fn joined_pair() -> (RunningEngine, RunningEngine, u16) {
    let (host, port) = RunningEngine::host().await;
    let mut client = RunningEngine::start(MemoryStore::default());
    client
        .request(UiRequest::ConnectRemote(format!("127.0.0.1:{port}")))
        .await;
    client.wait_for_mode(Mode::Client).await;
    (host, client, port)
}

#[tokio::test]
async fn client_engine_plays_on_the_host_board() {
    let (mut host, mut client, _port) = joined_pair().await;

    // The first connection gets X, which is on turn.
    client
        .wait_for(|event| match event {
            UiEvent::Board(view) if view.my_turn => Some(()),
            _ => None,
        })
        .await;

    client.request(UiRequest::Play(4)).await;
    host.wait_for_board("EEEEXEEEEOEEEE").await;
    client.wait_for_board("EEEEXEEEEOEEEE").await;

    // O is not owned by anybody, the host plays it locally.
    host.request(UiRequest::Play(0)).await;
    client.wait_for_board("OEEEXEEEEXEEEE").await;

    let store = client.stop().await;
    host.stop().await;
    assert_eq!(store_cells(&store), "OEEEXEEEE");
}

fn store_cells(store: &MemoryStore) -> String {
    use backbone_lib::GameStore;
    (0..9)
        .map(|index| store.get(&format!("Grid{index}"), "E"))
        .collect()
}

#[tokio::test]
async fn client_and_raw_connection_share_the_game() {
    let (host, mut client, port) = joined_pair().await;
    client
        .wait_for(|event| match event {
            UiEvent::Board(view) if view.my_turn => Some(()),
            _ => None,
        })
        .await;

    let mut raw = LineClient::join(port).await;
    assert_eq!(raw.recv().await, "Player=O");

    client.request(UiRequest::Play(2)).await;
    assert_eq!(raw.recv().await, "s:EEXEEEEEEOEEEE");
    raw.send("p:6").await;
    assert_eq!(raw.recv().await, "s:EEXEEEOEEXEEEE");
    client.wait_for_board("EEXEEEOEEXEEEE").await;

    client.stop().await;
    host.stop().await;
}

#[tokio::test]
async fn host_leaving_sends_the_client_back_to_local() {
    let (host, mut client, _port) = joined_pair().await;

    host.request(UiRequest::StartLocal).await;
    client.wait_for_mode(Mode::Local).await;

    // Local play works again right away.
    client.request(UiRequest::Play(8)).await;
    client.wait_for_board("EEEEEEEEXOEEEE").await;

    client.stop().await;
    host.stop().await;
}

#[tokio::test]
async fn failed_connect_keeps_the_current_mode() {
    let free_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut engine = RunningEngine::start(MemoryStore::default());
    engine
        .request(UiRequest::ConnectRemote(format!("127.0.0.1:{free_port}")))
        .await;
    engine
        .wait_for(|event| match event {
            UiEvent::Error(reason) => Some(reason.clone()),
            _ => None,
        })
        .await;

    engine.request(UiRequest::UpdateSettings).await;
    let settings = engine
        .wait_for(|event| match event {
            UiEvent::Settings(settings) => Some(settings.clone()),
            _ => None,
        })
        .await;
    assert_eq!(settings.mode, Mode::Local);
    assert!(settings.addresses.is_empty());
    engine.stop().await;
}

#[tokio::test]
async fn joining_elsewhere_closes_the_hosting_session() {
    let (mut first_host, first_port) = RunningEngine::host().await;
    let (second_host, second_port) = RunningEngine::host().await;

    let mut raw = LineClient::join(first_port).await;
    assert_eq!(raw.recv().await, "Player=X");

    // The first host becomes a client of the second one and drops its own clients.
    first_host
        .request(UiRequest::ConnectRemote(format!("127.0.0.1:{second_port}")))
        .await;
    first_host.wait_for_mode(Mode::Client).await;
    assert_eq!(raw.recv_or_closed().await.as_deref(), Some("shutdown"));
    assert_eq!(raw.recv_or_closed().await, None);

    first_host.stop().await;
    second_host.stop().await;
}
