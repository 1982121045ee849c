use sea_orm::Schema;

use super::prelude::*;

/// Creates every table and index the server uses, skipping the ones that already exist.
pub async fn create_tables(conn: &DatabaseConnection) -> Result<(), DbErr> {
    create_table_for(conn, Email).await?;
    create_table_for(conn, ComposioConnection).await?;

    Ok(())
}

async fn create_table_for<E>(conn: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    conn.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        conn.execute(backend.build(&index)).await?;
    }

    tracing::debug!("Ensured table {}", entity.table_name());
    Ok(())
}
