use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use course_rag_webapp::{
    api,
    app_state::{AppState, Status},
    config::AppConfig,
    embedding::OpenAiEmbedder,
    llm::RigBackend,
    neo4j_store::Neo4jChunkStore,
    rag::RagSystem,
};

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Conectar a Neo4j y asegurar esquema e índices vectoriales
    let store = Neo4jChunkStore::connect(&cfg)
        .await
        .expect("Error conectando a Neo4j");
    store
        .ensure_schema()
        .await
        .expect("Error asegurando el esquema de Neo4j");

    // 4. Construir embedder, backend de chat y sistema RAG
    let embedder = OpenAiEmbedder::from_config(&cfg).expect("Error inicializando el embedder");
    let backend = RigBackend::from_config(&cfg).expect("Error inicializando el backend LLM");
    let rag = Arc::new(RagSystem::new(
        &cfg,
        Arc::new(store),
        Arc::new(embedder),
        Arc::new(backend),
    ));

    // 5. Cargar los documentos iniciales (no fatal si falla)
    let docs_dir = Path::new(&cfg.docs_dir);
    if docs_dir.is_dir() {
        info!("Cargando documentos iniciales desde {}...", docs_dir.display());
        match rag.ingest_folder(docs_dir, false).await {
            Ok((courses, chunks)) => {
                info!("Cargados {courses} cursos con {chunks} chunks.");
            }
            Err(err) => error!("Error cargando documentos iniciales: {err:#}"),
        }
    } else {
        warn!("Directorio de documentos no encontrado: {}", docs_dir.display());
    }

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 6. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        rag,
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 7. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .nest("/", api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 8. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .expect("No se pudo abrir el puerto del servidor");
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el frontend en el navegador por defecto
    if webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Fallo del servidor HTTP");

    info!("✅ Servidor cerrado correctamente.");
}
