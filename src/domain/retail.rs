//! 零售领域工具
//!
//! 读写 users / orders / products 三张表。领域失败（找不到用户、订单状态不符）以 "Error: ..."
//! 文本作为观察返回；参数缺失或类型错误走 Err，由注册表转为 ToolExecution。

use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::domain::{Action, Dataset};
use crate::tools::adapter::{DatasetTool, FunctionSpec, ToolHandler};

/// 默认领域策略（可由 run.policy_path 覆盖）
pub const DEFAULT_POLICY: &str = "# Retail agent policy

As a retail agent, you can help users cancel or modify pending orders, look up order and product details, and update their default address.

- At the beginning of the conversation, you have to authenticate the user identity by locating their user id via email, or via name + zip code. This has to be done even when the user already provides the user id.
- Once the user has been authenticated, you can provide the user with information about order, product, profile information.
- You can only help one user per conversation, and must deny any requests for tasks related to any other user.
- Before taking consequential actions that update the database (cancel, modify address), you must list the action detail and obtain explicit user confirmation (yes) to proceed.
- You should not make up any information or knowledge or procedures not provided from the user or the tools.
- You should at most make one tool call at a time, and if you take a tool call, you should not respond to the user at the same time.

## Cancel pending order

- An order can only be cancelled if its status is 'pending', and you should check its status before taking the action.
- The user needs to confirm the order id and the reason (either 'no longer needed' or 'ordered by mistake') for cancellation.
- After user confirmation, the order status will be changed to 'cancelled', and the total will be refunded via the original payment method. Gift card refunds are immediate.

## Modify user address

- The user needs to provide the full new address: address1, address2, city, state, country and zip.
";

const CANCEL_REASONS: [&str; 2] = ["no longer needed", "ordered by mistake"];

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {key} must be a string"))
}

fn section<'a>(data: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    data.get(key).and_then(Value::as_object)
}

fn find_user_id_by_email(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    let email = string_arg(args, "email")?.to_lowercase();
    let found = section(data, "users").and_then(|users| {
        users.iter().find_map(|(id, profile)| {
            profile["email"]
                .as_str()
                .filter(|e| e.to_lowercase() == email)
                .map(|_| id.clone())
        })
    });
    Ok(found.unwrap_or_else(|| "Error: user not found".to_string()))
}

fn find_user_id_by_name_zip(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    let first = string_arg(args, "first_name")?.to_lowercase();
    let last = string_arg(args, "last_name")?.to_lowercase();
    let zip = string_arg(args, "zip")?;
    let found = section(data, "users").and_then(|users| {
        users.iter().find_map(|(id, p)| {
            let matches = p["name"]["first_name"].as_str().map(str::to_lowercase) == Some(first.clone())
                && p["name"]["last_name"].as_str().map(str::to_lowercase) == Some(last.clone())
                && p["address"]["zip"].as_str() == Some(zip);
            matches.then(|| id.clone())
        })
    });
    Ok(found.unwrap_or_else(|| "Error: user not found".to_string()))
}

fn lookup(data: &Value, table: &str, id: &str, missing: &str) -> String {
    section(data, table)
        .and_then(|t| t.get(id))
        .map(|v| v.to_string())
        .unwrap_or_else(|| format!("Error: {missing} not found"))
}

fn get_user_details(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    Ok(lookup(data, "users", string_arg(args, "user_id")?, "user"))
}

fn get_order_details(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    Ok(lookup(data, "orders", string_arg(args, "order_id")?, "order"))
}

fn get_product_details(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    Ok(lookup(data, "products", string_arg(args, "product_id")?, "product"))
}

fn list_all_product_types(data: &mut Value, _args: &Map<String, Value>) -> Result<String, String> {
    let mut types: Vec<(String, Value)> = section(data, "products")
        .map(|products| {
            products
                .values()
                .filter_map(|p| Some((p["name"].as_str()?.to_string(), p["product_id"].clone())))
                .collect()
        })
        .unwrap_or_default();
    types.sort_by(|a, b| a.0.cmp(&b.0));
    let map: Map<String, Value> = types.into_iter().collect();
    Ok(Value::Object(map).to_string())
}

fn cancel_pending_order(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    let order_id = string_arg(args, "order_id")?;
    let reason = string_arg(args, "reason")?;

    let Some(order) = data.pointer(&format!("/orders/{}", escape_pointer(order_id))).cloned() else {
        return Ok("Error: order not found".to_string());
    };
    if order["status"] != "pending" {
        return Ok("Error: non-pending order cannot be cancelled".to_string());
    }
    if !CANCEL_REASONS.contains(&reason) {
        return Ok("Error: invalid reason".to_string());
    }

    let user_id = order["user_id"].as_str().unwrap_or_default().to_string();
    let payments = order["payment_history"].as_array().cloned().unwrap_or_default();
    let mut refunds = Vec::with_capacity(payments.len());
    for payment in &payments {
        let method = payment["payment_method_id"].as_str().unwrap_or_default();
        let amount = payment["amount"].as_f64().unwrap_or(0.0);
        refunds.push(json!({
            "transaction_type": "refund",
            "amount": payment["amount"],
            "payment_method_id": method,
        }));
        if method.contains("gift_card") {
            let pointer = format!(
                "/users/{}/payment_methods/{}/balance",
                escape_pointer(&user_id),
                escape_pointer(method)
            );
            if let Some(balance) = data.pointer_mut(&pointer) {
                let updated = ((balance.as_f64().unwrap_or(0.0) + amount) * 100.0).round() / 100.0;
                *balance = json!(updated);
            }
        }
    }

    let pointer = format!("/orders/{}", escape_pointer(order_id));
    let Some(order) = data.pointer_mut(&pointer) else {
        return Ok("Error: order not found".to_string());
    };
    order["status"] = json!("cancelled");
    order["cancel_reason"] = json!(reason);
    if let Some(history) = order["payment_history"].as_array_mut() {
        history.extend(refunds);
    }
    Ok(order.to_string())
}

fn modify_user_address(data: &mut Value, args: &Map<String, Value>) -> Result<String, String> {
    let user_id = string_arg(args, "user_id")?;
    let mut address = Map::new();
    for key in ["address1", "address2", "city", "state", "country", "zip"] {
        address.insert(key.to_string(), json!(string_arg(args, key)?));
    }
    let pointer = format!("/users/{}", escape_pointer(user_id));
    let Some(user) = data.pointer_mut(&pointer) else {
        return Ok("Error: user not found".to_string());
    };
    user["address"] = Value::Object(address);
    Ok(user.to_string())
}

/// JSON Pointer 转义（~ 与 /）
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn string_props(props: &[(&str, &str)]) -> Value {
    let map: Map<String, Value> = props
        .iter()
        .map(|(k, d)| (k.to_string(), json!({"type": "string", "description": d})))
        .collect();
    Value::Object(map)
}

fn spec(name: &str, description: &str, props: &[(&str, &str)]) -> Value {
    let required: Vec<&str> = props.iter().map(|(k, _)| *k).collect();
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": string_props(props),
                "required": required,
            }
        }
    })
}

fn catalog() -> Vec<(Value, ToolHandler)> {
    vec![
        (
            spec(
                "find_user_id_by_email",
                "Find user id by email. If the user is not found, the function will return an error message.",
                &[("email", "The email of the user, such as 'something@example.com'.")],
            ),
            find_user_id_by_email,
        ),
        (
            spec(
                "find_user_id_by_name_zip",
                "Find user id by first name, last name, and zip code. If the user is not found, the function will return an error message. By default, find user id by email, and only call this function if the user is not found by email or cannot remember email.",
                &[
                    ("first_name", "The first name of the customer, such as 'John'."),
                    ("last_name", "The last name of the customer, such as 'Doe'."),
                    ("zip", "The zip code of the customer, such as '12345'."),
                ],
            ),
            find_user_id_by_name_zip,
        ),
        (
            spec(
                "get_user_details",
                "Get the details of an user, including their orders.",
                &[("user_id", "The user id, such as 'sara_doe_496'.")],
            ),
            get_user_details,
        ),
        (
            spec(
                "get_order_details",
                "Get the status and details of an order.",
                &[("order_id", "The order id, such as '#W0000000'. Be careful there is a '#' symbol at the beginning of the order id.")],
            ),
            get_order_details,
        ),
        (
            spec(
                "get_product_details",
                "Get the inventory details of a product.",
                &[("product_id", "The product id, such as '6086499569'. Be careful the product id is different from the item id.")],
            ),
            get_product_details,
        ),
        (
            spec(
                "list_all_product_types",
                "List the name and product id of all product types. Each product type has a variety of different items with unique item ids and options. There are only 50 product types in the store.",
                &[],
            ),
            list_all_product_types,
        ),
        (
            spec(
                "cancel_pending_order",
                "Cancel a pending order. If the order is already processed or delivered, it cannot be cancelled. The agent needs to explain the cancellation detail and ask for explicit user confirmation (yes/no) to proceed. If the user confirms, the order status will be changed to 'cancelled' and the payment will be refunded. The refund will be added to the user's gift card balance immediately if the payment was made using a gift card, otherwise the refund would take 5-7 business days to process. The function returns the order details after the cancellation.",
                &[
                    ("order_id", "The order id, such as '#W0000000'. Be careful there is a '#' symbol at the beginning of the order id."),
                    ("reason", "The reason for cancellation, which should be either 'no longer needed' or 'ordered by mistake'."),
                ],
            ),
            cancel_pending_order,
        ),
        (
            spec(
                "modify_user_address",
                "Modify the default address of an user. The agent needs to explain the modification detail and ask for explicit user confirmation (yes/no) to proceed.",
                &[
                    ("user_id", "The user id, such as 'sara_doe_496'."),
                    ("address1", "The first line of the address, such as '123 Main St'."),
                    ("address2", "The second line of the address, such as 'Apt 1' or ''."),
                    ("city", "The city, such as 'San Francisco'."),
                    ("state", "The province, such as 'CA'."),
                    ("country", "The country, such as 'USA'."),
                    ("zip", "The zip code, such as '12345'."),
                ],
            ),
            modify_user_address,
        ),
    ]
}

/// 绑定到 dataset 的全部零售工具
pub fn retail_tools(dataset: &Dataset) -> Result<Vec<DatasetTool>, AgentError> {
    catalog()
        .into_iter()
        .map(|(spec, handler)| {
            Ok(DatasetTool::from_spec(
                FunctionSpec::from_value(spec)?,
                handler,
                dataset.clone(),
            ))
        })
        .collect()
}

/// 按名字查处理函数
pub fn handler_for(name: &str) -> Option<ToolHandler> {
    catalog().into_iter().find_map(|(spec, handler)| {
        (spec["function"]["name"].as_str() == Some(name)).then_some(handler)
    })
}

/// 在 dataset 上依次重放标准动作，得到标准终态
pub fn replay_actions(dataset: &Dataset, actions: &[Action]) -> Result<(), AgentError> {
    for action in actions {
        let handler = handler_for(&action.name).ok_or_else(|| AgentError::UnknownTool {
            name: action.name.clone(),
            available: catalog()
                .iter()
                .filter_map(|(s, _)| s["function"]["name"].as_str().map(String::from))
                .collect(),
        })?;
        dataset
            .with_mut(|data| handler(data, &action.kwargs))
            .map_err(|message| AgentError::ToolExecution {
                tool: action.name.clone(),
                message,
                description: String::new(),
            })?;
    }
    Ok(())
}
