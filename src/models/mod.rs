// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Chaque modèle correspond à une table avec SeaORM.
//
// Liste des modules:
//   - health : Health check API
//   - dto : Data Transfer Objects (requêtes / réponses de l'API)
//   - users : Utilisateurs (auth locale + identité fédérée) et solde de crédits
//   - summaries : Résumés générés (unité de travail facturable)
//   - refresh_tokens : Refresh tokens (rotation, usage unique)
//
// Points d'attention:
//   - Tous les modèles utilisent SeaORM (pas de SQL brut, sauf l'index
//     partiel créé dans la migration)
//   - users possède summaries et refresh_tokens (ON DELETE CASCADE)
//
// ============================================================================

pub mod health;
pub mod dto;
pub mod users;
pub mod summaries;
pub mod refresh_tokens;
