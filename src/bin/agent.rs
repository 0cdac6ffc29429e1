use clap::Parser;
use tally::{
    agent::Dispatcher,
    config::AgentArgs,
    sampler::{host::HostSampler, runtime::RuntimeSampler},
    util::{init_tracing, local_ip_towards, shutdown_signal},
};
use tracing::{debug, info, trace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = AgentArgs::parse();
    let config = args.resolve()?;
    init_tracing("tally_agent", config.log_level);
    trace!("resolved config: {:?}", config.dispatch_settings());

    let detected_ip = match config.real_ip {
        Some(_) => None,
        None => local_ip_towards(&config.address),
    };
    debug!("announcing address {:?}", config.real_ip.or(detected_ip));

    let transport = config.transport(detected_ip)?;

    let dispatcher = Dispatcher::new(config.dispatch_settings(), transport)
        .with_sampler(RuntimeSampler::new())
        .with_sampler(HostSampler::new())
        .start();

    info!(
        "agent running (poll every {:?}, report every {:?}, {} workers)",
        config.poll_interval, config.report_interval, config.rate_limit
    );

    shutdown_signal().await;
    dispatcher.shutdown().await;

    Ok(())
}
