use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{
            AuthResponse, ChangePasswordRequest, LoginRequest, LogoutRequest, RefreshRequest,
            SignupRequest, TokenPair, UpdateProfileRequest,
        },
        cart::{AddItemRequest, CartDto, CartItemDto, UpdateItemRequest},
        categories::{CategoryDto, CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
    },
    error::FieldError,
    models::{Order, OrderItem, Product, User},
    response::{ApiResponse, Meta},
    routes::{auth, cart, categories, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::signup,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::profile,
        auth::update_profile,
        auth::change_password,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::featured_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::create_order,
        orders::list_orders,
        orders::my_orders,
        orders::get_order,
        orders::update_status
    ),
    components(
        schemas(
            User,
            Product,
            Order,
            OrderItem,
            SignupRequest,
            LoginRequest,
            RefreshRequest,
            LogoutRequest,
            UpdateProfileRequest,
            ChangePasswordRequest,
            TokenPair,
            AuthResponse,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryDto,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            AddItemRequest,
            UpdateItemRequest,
            CartItemDto,
            CartDto,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            params::Pagination,
            params::CategoryQuery,
            params::ProductQuery,
            params::OrderListQuery,
            health::HealthData,
            FieldError,
            Meta,
            ApiResponse<User>,
            ApiResponse<AuthResponse>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CategoryDto>,
            ApiResponse<CategoryList>,
            ApiResponse<CartDto>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication and account endpoints"),
        (name = "Categories", description = "Category catalog endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
