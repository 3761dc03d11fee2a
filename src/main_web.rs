// Web control panel for launching and monitoring DQN training runs.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};

use gym_trainer::config;
use gym_trainer::log_info;
use gym_trainer::web::response_helpers::cors_preflight;
use gym_trainer::web::routes;
use gym_trainer::web::worker::{SharedSupervisor, TrainingSupervisor};

async fn handle_request(
    req: Request<Body>,
    supervisor: SharedSupervisor,
) -> Result<Response<Body>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => routes::index::handle().await,

        (&Method::GET, "/health") => routes::health::handle().await,

        (&Method::POST, "/start_training") => routes::training::handle_start(req, supervisor).await,

        (&Method::POST, "/stop_training") => routes::training::handle_stop(supervisor).await,

        (&Method::GET, "/training_status") => routes::training::handle_status(supervisor).await,

        (&Method::GET, "/videos") => routes::videos::handle().await,

        (&Method::GET, path) if path.starts_with("/static/videos/") => {
            routes::static_files::handle(path).await
        }

        (&Method::OPTIONS, _) => Ok(cors_preflight()),

        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not Found"))
            .unwrap()),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Directories the handlers expect to exist
    std::fs::create_dir_all(config::MODELS_DIR)?;
    std::fs::create_dir_all(config::VIDEOS_DIR)?;

    let supervisor: SharedSupervisor = Arc::new(TrainingSupervisor::new());

    let make_svc = make_service_fn({
        let supervisor = supervisor.clone();
        move |_conn| {
            let supervisor = supervisor.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(req, supervisor.clone())
                }))
            }
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], 8000));
    let server = Server::bind(&addr).serve(make_svc);

    log_info!("[SERVER] Listening on http://{}", addr);
    println!("Gym Trainer Web starting on http://{addr}");
    println!("Available endpoints:");
    println!("  GET  /                 - Training control panel");
    println!("  POST /start_training   - Launch a training run");
    println!("  POST /stop_training    - Stop the running job");
    println!("  GET  /training_status  - Poll job liveness");
    println!("  GET  /videos           - List gameplay recordings");
    println!("  GET  /health           - Health check");

    server
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    Ok(())
}
