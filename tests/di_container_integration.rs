//! Wiring the app with in-memory adapters.

use std::path::PathBuf;

use autodrive_rl::{
    AgentKind, App, ExperimentConfig,
    adapters::{InMemoryCheckpointRepository, InMemoryScalarSink},
    app::Device,
    pipeline::{RecordingObserver, tags},
    simulator::SingleCarConfig,
};

fn quick_config(kind: AgentKind) -> ExperimentConfig {
    ExperimentConfig {
        algo: kind,
        seed: 42,
        training_eps: 6,
        eval_per_train: 3,
        evaluation_eps: 2,
        max_step: 20,
        threshold_return: -1.0e9,
        tensorboard: false,
        save_dir: PathBuf::from("in_memory"),
        ..ExperimentConfig::default()
    }
}

#[test]
fn experiment_runs_without_touching_disk() {
    let repo = InMemoryCheckpointRepository::new();
    let app = App::for_testing().with_repository(repo.clone()).build();
    let config = quick_config(AgentKind::Td3);

    let mut agent = app.create_agent(&config, app.run_context(&config)).unwrap();
    let sink = InMemoryScalarSink::new();
    let recorder = RecordingObserver::new();
    let mut experiment = app
        .create_experiment(config.clone(), Box::new(sink.clone()))
        .with_observer(Box::new(recorder.clone()));
    let summary = experiment.run(agent.as_mut()).unwrap();

    assert_eq!(summary.evaluations.len(), 2);
    assert_eq!(repo.count(), 2);
    assert_eq!(repo.paths(), {
        let mut expected = summary.checkpoints.clone();
        expected.sort();
        expected
    });
    assert!(!PathBuf::from("in_memory").exists());
    assert_eq!(sink.by_tag(tags::TRAIN_EPISODE_RETURNS).len(), 6);
    assert_eq!(recorder.reports().len(), 2);
}

#[test]
fn checkpoints_from_one_run_warm_start_the_next() {
    let repo = InMemoryCheckpointRepository::new();
    let app = App::for_testing().with_repository(repo.clone()).build();
    let config = quick_config(AgentKind::Ppo);

    let mut agent = app.create_agent(&config, app.run_context(&config)).unwrap();
    let summary = app
        .create_experiment(config.clone(), Box::new(InMemoryScalarSink::new()))
        .run(agent.as_mut())
        .unwrap();
    let latest = summary.checkpoints.last().unwrap().clone();

    let warm = ExperimentConfig {
        model_path: Some(latest.clone()),
        ..config
    };
    let restored = app.create_agent(&warm, app.run_context(&warm)).unwrap();
    assert_eq!(restored.policy(), agent.policy());

    let saved = app.load_checkpoint(&latest).unwrap();
    assert_eq!(saved.metadata.algo, AgentKind::Ppo);
    assert_eq!(saved.metadata.episodes, 6);
}

#[test]
fn missing_warm_start_checkpoint_is_an_error() {
    let app = App::for_testing()
        .with_repository(InMemoryCheckpointRepository::new())
        .build();
    let config = ExperimentConfig {
        model_path: Some(PathBuf::from("nowhere.msgpack")),
        ..quick_config(AgentKind::Sac)
    };
    assert!(app.create_agent(&config, app.run_context(&config)).is_err());
}

#[test]
fn device_falls_back_to_host_without_accelerator() {
    let config = ExperimentConfig {
        gpu_index: 2,
        ..quick_config(AgentKind::Ddpg)
    };

    let host = App::for_testing().build();
    assert_eq!(host.run_context(&config).device, Device::Cpu);

    let accelerated = App::for_testing().with_accelerator(true).build();
    assert_eq!(accelerated.run_context(&config).device, Device::Gpu(2));
}

#[test]
fn custom_scenario_is_used_by_agents() {
    let scenario = SingleCarConfig {
        route_length: 5.0,
        ..SingleCarConfig::default()
    };
    let app = App::for_testing().with_environment(scenario).build();
    let config = quick_config(AgentKind::Vpg);
    let mut agent = app.create_agent(&config, app.run_context(&config)).unwrap();
    let result = agent.run(1000).unwrap();
    assert!(result.steps < 1000);
}

#[test]
fn invalid_scenario_is_rejected() {
    let scenario = SingleCarConfig {
        dt: 0.0,
        ..SingleCarConfig::default()
    };
    let app = App::for_testing().with_environment(scenario).build();
    let config = quick_config(AgentKind::Vpg);
    assert!(app.create_agent(&config, app.run_context(&config)).is_err());
}
