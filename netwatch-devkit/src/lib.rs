/*!
# netwatch DevKit - Doubles de test pour le moteur de surveillance

Bibliothèque facilitant les tests du kernel netwatch avec:
- Prober scripté (aucun ping réel)
- Canal d'alerte enregistreur
- Horloge manuelle
- Harness composant un `Monitor` complet
*/

pub mod alert_stub;
pub mod clock;
pub mod prober_stub;
pub mod test_utils;

pub use alert_stub::RecordingAlertChannel;
pub use clock::ManualClock;
pub use prober_stub::{Reply, ScriptedProber};
pub use test_utils::{field, Subscriber, TestHarness};
