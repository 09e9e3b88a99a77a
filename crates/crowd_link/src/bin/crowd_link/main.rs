mod sim;

use crowd_link::{
    error,
    util::{FutExt as _, Left},
    Config, Event, Executor, Integration, ProbeStatus, TcpConnector,
};

use async_io::Timer;
use std::{collections::VecDeque, sync::Arc, time::Duration};

fn init_logger() -> anyhow::Result<()> {
    alto_logger::init_alt_term_logger()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    simple_env_load::load_env_from(&[".env", ".env.dev"]);
    init_logger()?;

    let config = Config::load()?;
    let tick_rate = Duration::from_millis(config.simulation.tick_millis.max(1));
    let test_only = std::env::args().skip(1).any(|arg| arg == "--test");

    let executor = Executor::new(2)?;
    let connector = Arc::new(TcpConnector::twitch());

    let mut integration = match Integration::new(config, connector, executor, sim::dispatcher()) {
        Some(integration) => integration,
        None => return Ok(()),
    };

    if test_only {
        return test_configuration(&mut integration, tick_rate);
    }

    let mut ctrl_c = Box::pin(async_ctrlc::CtrlC::new()?);
    let mut world = sim::World::default();
    let mut queue = VecDeque::new();

    integration.start(0, &mut queue);

    futures_lite::future::block_on(async {
        for tick in 0.. {
            for envelope in queue.drain(..) {
                if let Some(err) = error::is_real_error(world.run(&mut integration, envelope)) {
                    log::error!("cannot run command: {}", err);
                }
            }
            world.step();

            if let Left(..) = ctrl_c.as_mut().first(Timer::after(tick_rate)).await {
                log::info!("got a ^C, exiting");
                break;
            }

            for event in integration.tick(tick, &mut queue) {
                if let Event::PlayersChanged(count) = event {
                    log::info!("{} viewer(s) playing", count);
                }
            }
        }
    });

    log::info!(
        "{} drone(s) and {} player(s) at exit",
        world.len(),
        integration.player_count()
    );
    integration.shutdown();
    Ok(())
}

fn test_configuration(
    integration: &mut Integration<sim::Action>,
    tick_rate: Duration,
) -> anyhow::Result<()> {
    integration.test_configuration()?;
    loop {
        if let Some(status) = integration.poll_test() {
            return match status {
                ProbeStatus::Sent => Ok(()),
                status => Err(anyhow::anyhow!("the connection test failed: {:?}", status)),
            };
        }
        std::thread::sleep(tick_rate);
    }
}
