//! User-facing texts and button menus

use crate::messenger::{Button, ButtonRow};

pub const UNKNOWN_COMMAND: &str =
    "К сожалению, данная команда мне неизвестна. Для начала работы введите /start";
pub const CATEGORY_SAVED: &str = "Категория успешно сохранена.";
pub const CATEGORY_PROMPT: &str = "Введите название новой категории. Для отмены введите «.»";
pub const CATEGORY_EMPTY: &str = "Пока нет категорий, сначала добавьте хотя бы одну категорию.";
pub const CATEGORY_CHOOSE: &str = "Выберите категорию:";
pub const RECORD_SAVED: &str = "Запись успешно сохранена.";
pub const RECORD_OVER_LIMIT: &str =
    "Запись не сохранена: превышен бюджет расходов в текущем месяце.";
pub const REPORT_PERIOD_PROMPT: &str = "За какой период будем смотреть отчёт? Команды периодов: /report_w - неделя, /report_m - месяц, /report_y - год";
pub const REPORT_PREPARING: &str = "Отчёт готовится, пришлю его отдельным сообщением.";
pub const REPORT_FAILED: &str = "Не удалось подготовить отчёт, попробуйте позже.";
pub const REPORT_TOTAL: &str = "Итого";
pub const REPORT_AMOUNT_HEADER: &str = "Сумма";
pub const REPORT_CATEGORY_HEADER: &str = "Категория";
pub const HELP: &str = "Я - бот, помогающий вести учёт расходов. Для начала работы введите /start";
pub const CURRENCY_CHOOSE: &str = "Выберите валюту:";
pub const CURRENCY_SET_ERROR: &str = "Ошибка сохранения валюты.";
pub const LIMIT_UNLIMITED: &str = "не ограничен";
pub const CANCELLED: &str = "Ввод отменён.";

// Turn failures
pub const ERR_AMOUNT: &str = "Не удалось распознать сумму. Введите положительное число, например 12.50";
pub const ERR_CONVERSION: &str = "Ошибка конвертации валюты.";
pub const ERR_STORAGE: &str = "Не удалось сохранить или получить данные, попробуйте позже.";
pub const ERR_TIMEOUT: &str = "Сервис не ответил вовремя, попробуйте ещё раз.";
pub const ERR_GENERIC: &str = "Что-то пошло не так, попробуйте ещё раз.";

// Per-line import failures
pub const LINE_ERR_FORMAT: &str = "Неверный формат строки.";
pub const LINE_ERR_CATEGORY: &str = "Не удалось добавить категорию.";
pub const LINE_ERR_CONVERSION: &str = "Не удалось конвертировать валюту.";
pub const LINE_ERR_OVER_LIMIT: &str = "Превышение бюджета.";
pub const LINE_ERR_RECORD: &str = "Не удалось сохранить запись.";

/// Marker that prefixes every per-line import error
pub const LINE_ERROR_TAG: &str = "Ошибка.";

pub fn start(name: &str) -> String {
    format!("Привет, *{name}*. Я помогаю вести учёт расходов. Выберите действие.")
}

pub fn category_chosen(category: &str, currency: &str) -> String {
    format!(
        "Выбрана категория *{category}*. Введите сумму (только число). Для отмены введите «.». Используемая валюта: *{currency}*"
    )
}

pub fn currency_set(code: &str) -> String {
    format!("Валюта изменена на *{code}*.")
}

pub fn limit_set(value: &str) -> String {
    format!("Бюджет изменён на *{value}*.")
}

pub fn limit_prompt(current: &str) -> String {
    format!(
        "Текущий бюджет на месяц: *{current}*. Введите новый бюджет (0 - без ограничений). Для отмены введите «.»"
    )
}

pub fn table_prompt(currency: &str) -> String {
    format!(
        "Введите данные о расходах, каждая запись с новой строки в формате `ГГГГ-ММ-ДД сумма категория`, суммы в валюте *{currency}*. Например:\n\
         `2024-03-01 15.50 Продукты`\n\
         `2024-03-02 7 Транспорт`\n\
         Для отмены введите «.»"
    )
}

pub fn import_summary(saved: usize, total: usize) -> String {
    format!("Данные сохранены (записей: {saved} из {total}).")
}

pub fn line_error(line_number: usize, reason: &str) -> String {
    format!("{line_number}. {LINE_ERROR_TAG} {reason}")
}

pub fn report_heading(period_title: &str, currency: &str) -> String {
    format!("Расходы за {period_title}, {currency}:")
}

pub fn report_empty(period_title: &str) -> String {
    format!("Нет данных о расходах за {period_title}.")
}

/// Root menu shown on /start
pub fn start_menu() -> Vec<ButtonRow> {
    vec![
        vec![
            Button::new("Добавить категорию", "/add_cat"),
            Button::new("Добавить расход", "/add_rec"),
        ],
        vec![
            Button::new("Отчёт за неделю", "/report_w"),
            Button::new("Отчёт за месяц", "/report_m"),
            Button::new("Отчёт за год", "/report_y"),
        ],
        vec![Button::new("Ввести данные за прошлый период", "/add_tbl")],
        vec![
            Button::new("Выбрать валюту", "/choice_currency"),
            Button::new("Установить лимит", "/set_limit"),
        ],
    ]
}

const BUTTONS_PER_ROW: usize = 3;

/// One button per category, payload `/cat <name>`
pub fn category_buttons(categories: &[String]) -> Vec<ButtonRow> {
    categories
        .chunks(BUTTONS_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|name| Button::new(name.clone(), format!("/cat {name}")))
                .collect()
        })
        .collect()
}

/// One button per currency with `current` first, payload `/curr <code>`
pub fn currency_buttons(current: &str, currencies: &[String]) -> Vec<ButtonRow> {
    let mut ordered: Vec<&String> = Vec::with_capacity(currencies.len());
    ordered.extend(currencies.iter().filter(|code| code.as_str() == current));
    ordered.extend(currencies.iter().filter(|code| code.as_str() != current));
    ordered
        .chunks(BUTTONS_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|code| Button::new(code.as_str(), format!("/curr {code}")))
                .collect()
        })
        .collect()
}
