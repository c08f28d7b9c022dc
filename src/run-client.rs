mod common;
mod client;

use std::time::Duration;

use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*};
use clap::Parser;

use common::{
    error::NetError,
    message::*,
    resources::*,
    systems::forward_notifications,
};
use client::{
    resources::*,
    systems::{ability, input, renet},
};

#[derive(Debug, Parser)]
#[command(name = "client", about = "Terminal client predicting its own ability use")]
struct Args {
    /// Server to connect to
    #[arg(long, default_value = "127.0.0.1:5000")]
    server: String,
}

fn main() -> Result<(), NetError> {
    let args = Args::parse();
    let connection = Connection::new(&args.server)?;

    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1. / 60.))),
        LogPlugin {
            level: bevy::log::Level::TRACE,
            filter:  "bevy=warn,".to_owned()
                    +"client=info,"
                    +"client::client::systems::reconcile=debug,"
                    ,
            ..default()
        },
    ));

    app.add_message::<Do>();
    app.add_message::<Try>();
    app.add_message::<Notify>();

    app.init_resource::<AbilityConfig>();
    app.init_resource::<GameClock>();
    app.init_resource::<EntityMap>();
    app.init_resource::<Client>();
    app.insert_resource(connection);
    app.insert_resource(Console::stdin());

    app.add_systems(PreUpdate, (
        update_clock,
        renet::update_transport,
        renet::send_do,
        ability::do_spawn,
        ability::do_ability,
    ).chain());
    app.add_systems(Update, (
        input::do_console,
        ability::update,
        ability::try_requests,
    ).chain());
    app.add_systems(PostUpdate, (
        renet::write_try,
        renet::send_packets,
        forward_notifications,
        ability::log_notifications,
    ).chain());

    info!("connecting to {}", args.server);
    app.run();
    Ok(())
}
