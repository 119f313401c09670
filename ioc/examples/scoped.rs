use fibre_ioc::{Container, Registry};
use std::sync::Arc;

// A pretend database handle with a visible lifecycle.
struct Session {
  id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let registry = Arc::new(Registry::new());
  registry.register_value(String::from("postgres://localhost/app"));
  registry.register_factory_with_cleanup(
    |_| {
      println!("Opening session...");
      Ok(Session { id: 7 })
    },
    |session: Arc<Session>| async move {
      println!("Closing session {}", session.id);
    },
  );
  registry.on_close("pool", || async {
    println!("Draining connection pool");
  });

  // One container per unit of work.
  for request in 0..2 {
    let container = Container::new(registry.clone());
    let url = container.get::<String>()?;
    let session = container.get::<Session>()?;
    println!("request {request}: session {} on {url}", session.id);
    container.close().await;
  }

  registry.close().await;
  assert!(!registry.contains::<Session>());
  Ok(())
}
