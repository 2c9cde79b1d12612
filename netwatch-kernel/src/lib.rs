/*!
# netwatch kernel - Moteur de surveillance de disponibilité

Ping planifié des équipements du registre, état courant par catégorie,
alertes dédupliquées et diffusion temps réel vers les dashboards.

Composants :
- `probe` / `retry` : un ping, puis un verdict avec retry et backoff
- `schedule` / `scheduler` : plages horaires et cycles par lots
- `store` / `gate` : état des équipements et déduplication des alertes
- `publisher` / `ws` / `http` : diffusion et surface réseau
- `registry` / `watcher` / `config` : fichiers de configuration
- `monitor` : orchestrateur qui compose le tout
*/

pub mod alerts;
pub mod config;
pub mod gate;
pub mod health;
pub mod history;
pub mod http;
pub mod models;
pub mod monitor;
pub mod probe;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod watcher;
pub mod ws;

pub use monitor::{Monitor, MonitorDeps};
