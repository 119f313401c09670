use fibre_host::{App, AppConfig, BoxError};
use fibre_ioc::{Container, Registry};
use fibre_svcs::{RegistryFactory, SvcsPlugin, SvcsPluginConfig};
use std::sync::Arc;

// A pretend connection pool shared by every request.
struct Pool {
  url: String,
}

async fn build_registry() -> Result<Registry, BoxError> {
  let registry = Registry::new();
  let pool = Arc::new(Pool {
    url: "postgres://localhost/app".to_string(),
  });
  {
    let pool = pool.clone();
    registry.register_factory(move |_| {
      Ok(Pool {
        url: pool.url.clone(),
      })
    });
  }
  registry.on_close("pool", move || async move {
    println!("Draining pool for {}", pool.url);
  });
  Ok(registry)
}

// Something that runs outside dependency injection, like a middleware.
async fn audit(plugin: &SvcsPlugin) -> Result<(), BoxError> {
  plugin
    .get_container(|container| async move {
      let pool = container.get::<Pool>()?;
      println!("audit: using {}", pool.url);
      Ok::<_, BoxError>(())
    })
    .await?
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
  tracing_subscriber::fmt()
    .with_env_filter("debug")
    .init();

  let plugin = SvcsPlugin::new(SvcsPluginConfig::with_factory(
    RegistryFactory::new_async(build_registry),
  ));
  let app = App::new(AppConfig::new().plugin(plugin.clone()))?;
  app.startup().await?;

  for request in 0..2 {
    app
      .handle(|scope| async move {
        let container = scope.resolve::<Container>("svcs_container").await?;
        let pool = container.get::<Pool>()?;
        println!("request {request}: {}", pool.url);
        Ok::<_, BoxError>(())
      })
      .await?;
  }
  audit(&plugin).await?;

  app.shutdown().await?;
  Ok(())
}
