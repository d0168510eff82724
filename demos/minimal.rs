//! Minimal standalone accessory: a single lightbulb, paired with the PIN
//! printed to stdout. Run with `cargo run --example minimal`.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use hap::categories::Category;
use hap::model::{catalog, Accessory, Service, Value};
use hap::state::State;
use hap::Config;
use tokio_util::sync::CancellationToken;

fn accessory_information() -> Service {
    let mut svc = catalog::service("accessory-information").expect("catalog entry exists");
    let values = [
        ("manufacturer", "Rust HAP"),
        ("model", "Lightbulb"),
        ("name", "Rust Lightbulb"),
        ("serial-number", "0001"),
        ("firmware-revision", "1.0.0"),
    ];
    for (name, value) in values {
        let type_id = catalog::characteristic(name).expect("catalog entry exists").type_id;
        if let Some(c) = svc.characteristics_mut().iter_mut().find(|c| c.type_id == type_id) {
            c.set_value(Value::String(value.to_string())).expect("valid string");
        }
    }
    svc
}

fn lightbulb_accessory() -> Accessory {
    let mut acc = Accessory::new(hap::model::STANDALONE_AID, Category::Lightbulb);
    acc.add_service(accessory_information());
    acc.add_service(catalog::service("lightbulb").expect("catalog entry exists"));
    acc
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        51826,
        "Rust Lightbulb",
        Category::Lightbulb,
        "031-45-154",
        "ABCD",
        PathBuf::from("/tmp/hap-minimal-state.json"),
    )?;

    let pincode = config.pincode_bytes()?;
    let state = match hap::persist::load(
        &config.persist_path,
        config.address,
        pincode,
        config.port,
        config.setup_id().to_string(),
    )
    .await?
    {
        Some(state) => state,
        None => State::new(
            config.address,
            "11:22:33:44:55:66".to_string(),
            pincode,
            config.port,
            config.setup_id().to_string(),
        ),
    };

    let accessories = vec![lightbulb_accessory()];
    let capabilities = Default::default();

    let driver = hap::driver::Driver::bind(config, state, accessories, capabilities).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    driver.run(cancel).await;
    Ok(())
}
