use axum_marketplace_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{inventory_records, products, users},
};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin").await?;
    let customer_id = ensure_user(&orm, "customer@example.com", "customer").await?;
    let supplier_a = ensure_user(&orm, "supplier-a@example.com", "supplier").await?;
    let supplier_b = ensure_user(&orm, "supplier-b@example.com", "supplier").await?;

    seed_products(&orm, supplier_a, supplier_b).await?;

    println!(
        "Seed completed. Admin: {admin_id}, Customer: {customer_id}, Suppliers: {supplier_a}, {supplier_b}"
    );
    Ok(())
}

async fn ensure_user(orm: &OrmConn, email: &str, role: &str) -> anyhow::Result<Uuid> {
    if let Some(existing) = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already present (role={})", existing.role);
        return Ok(existing.id);
    }

    let id = Uuid::new_v4();
    let user = users::ActiveModel {
        id: Set(id),
        email: Set(email.to_string()),
        role: Set(role.to_string()),
        created_at: NotSet,
    };
    users::Entity::insert(user).exec_without_returning(orm).await?;
    println!("Created user {email} (role={role})");
    Ok(id)
}

async fn seed_products(orm: &OrmConn, supplier_a: Uuid, supplier_b: Uuid) -> anyhow::Result<()> {
    let products = vec![
        (supplier_a, "Kente Scarf", "Handwoven kente scarf", 180, 0, 50),
        (supplier_a, "Shea Butter 500g", "Unrefined shea butter", 65, 5, 120),
        (supplier_b, "Bogolan Tote", "Mudcloth tote bag", 140, 0, 35),
        (supplier_b, "Adinkra Print Tee", "Cotton tee, screen printed", 90, 10, 80),
    ];

    for (supplier_id, name, desc, price, discount, stock) in products {
        let product_id = Uuid::new_v4();
        let inserted = products::Entity::insert(products::ActiveModel {
            id: Set(product_id),
            supplier_id: Set(supplier_id),
            name: Set(name.to_string()),
            description: Set(Some(desc.to_string())),
            price: Set(price),
            discount: Set(discount),
            stock: Set(stock),
            created_at: NotSet,
        })
        .on_conflict(
            OnConflict::column(products::Column::Name)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(orm)
        .await?;

        if inserted == 0 {
            continue;
        }

        inventory_records::Entity::insert(inventory_records::ActiveModel {
            id: Set(Uuid::new_v4()),
            supplier_id: Set(supplier_id),
            product_id: Set(product_id),
            stock: Set(stock),
            updated_at: NotSet,
        })
        .on_conflict(
            OnConflict::columns([
                inventory_records::Column::SupplierId,
                inventory_records::Column::ProductId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
