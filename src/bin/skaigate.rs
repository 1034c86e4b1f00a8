use skaigate::activity::{ActivityCommandRequest, ActivityProcessor};
use skaigate::config::PipelineConfig;
use skaigate::network::{NetworkOrchestrator, NetworkRequest};
use skaigate::parser::{CompletionClient, HttpCompletionClient};
use skaigate::pipeline::{ApiResponse, CommandPipeline, CommandRequest};
use skaigate::scope::StoreIdentityProvider;
use skaigate::store::SqliteStore;
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "function")]
enum DispatchRequest {
    Command {
        token: String,
        request: CommandRequest,
    },
    Activity {
        request: ActivityCommandRequest,
    },
    Network {
        token: String,
        request: NetworkRequest,
    },
}

fn run() -> Result<ApiResponse, String> {
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut db_path = PathBuf::from("skaigate.db");
    let mut state_root: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(
                    args.next().ok_or("--config requires a path")?,
                ))
            }
            "--db" => db_path = PathBuf::from(args.next().ok_or("--db requires a path")?),
            "--state-root" => {
                state_root = Some(PathBuf::from(
                    args.next().ok_or("--state-root requires a path")?,
                ))
            }
            other => return Err(format!("unknown argument `{other}`")),
        }
    }

    let config = match config_path {
        Some(path) => PipelineConfig::load(&path).map_err(|err| err.to_string())?,
        None => PipelineConfig::default_deployment(),
    };

    let store = SqliteStore::open(&db_path).map_err(|err| err.to_string())?;
    store.ensure_schema().map_err(|err| err.to_string())?;
    let identity = StoreIdentityProvider::new(&store);

    let completion_client = HttpCompletionClient::from_config(&config.model).ok();
    let completion: Option<&dyn CompletionClient> = completion_client
        .as_ref()
        .map(|client| client as &dyn CompletionClient);

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|err| format!("failed to read request from stdin: {err}"))?;
    let dispatch: DispatchRequest =
        serde_json::from_str(&input).map_err(|err| format!("invalid request body: {err}"))?;

    let response = match dispatch {
        DispatchRequest::Command { token, request } => {
            let pipeline = CommandPipeline {
                config: &config,
                store: &store,
                identity: &identity,
                completion,
                state_root: state_root.as_deref(),
            };
            pipeline.handle(&token, &request)
        }
        DispatchRequest::Activity { request } => {
            let processor = ActivityProcessor {
                config: &config,
                store: &store,
                completion,
                state_root: state_root.as_deref(),
            };
            processor.handle(&request)
        }
        DispatchRequest::Network { token, request } => {
            let orchestrator = NetworkOrchestrator {
                config: &config,
                store: &store,
                identity: &identity,
                completion,
                state_root: state_root.as_deref(),
            };
            orchestrator.handle(&token, &request)
        }
    };
    Ok(response)
}

fn main() {
    match run() {
        Ok(response) => {
            println!("{}", response.status);
            println!("{}", response.body);
            if response.status >= 400 {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}
