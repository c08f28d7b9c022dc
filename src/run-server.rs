mod common;
mod server;

use std::time::Duration;

use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*};
use clap::Parser;

use common::{
    error::NetError,
    message::*,
    resources::*,
    systems::forward_notifications,
};
use server::{
    resources::*,
    systems::{combat, npc_ability_usage, renet},
};

#[derive(Debug, Parser)]
#[command(name = "server", about = "Authoritative ability server")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    #[arg(long, default_value_t = 64)]
    max_clients: usize,

    /// Spawn a training dummy that casts on its own
    #[arg(long)]
    dummy: bool,
}

fn main() -> Result<(), NetError> {
    let args = Args::parse();
    let connections = Connections::new(&args.bind, args.max_clients)?;

    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1. / 60.))),
        LogPlugin {
            level: bevy::log::Level::TRACE,
            filter:  "bevy=warn,".to_owned()
                    +"server=debug,"
                    +"server::server::systems::renet=info,"
                    ,
            ..default()
        },
    ));

    app.add_message::<Do>();
    app.add_message::<Try>();
    app.add_message::<Notify>();

    app.init_resource::<AbilityConfig>();
    app.init_resource::<GameClock>();
    app.init_resource::<Lobby>();
    app.insert_resource(connections);

    if args.dummy {
        app.add_systems(Startup, npc_ability_usage::spawn_training_dummy);
    }
    app.add_systems(PreUpdate, (
        update_clock,
        renet::update_transport,
        renet::do_manage_connections,
        renet::write_try,
    ).chain());
    app.add_systems(Update, (
        combat::try_ability,
        combat::interrupt_casts,
        combat::update,
        combat::recharge,
        npc_ability_usage::npc_ability_usage,
    ).chain());
    app.add_systems(PostUpdate, (
        combat::replicate_crowd_control,
        combat::replicate_restrictions,
        forward_notifications,
        combat::replicate_abilities,
        renet::send_do,
        renet::send_packets,
    ).chain());

    info!("listening on {}", args.bind);
    app.run();
    Ok(())
}
