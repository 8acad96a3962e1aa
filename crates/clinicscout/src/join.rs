use crate::types::{Dataset, DatasetError, Record};

/// Inner-joins every dataset on `key`, left to right. A row survives only if
/// its key appears in every dataset; absent keys never match. Non-key columns
/// that already exist on the left are dropped from the right side.
///
/// Joining zero datasets yields an empty dataset with no columns.
pub fn inner_join(datasets: Vec<Dataset>, key: &str) -> Result<Dataset, DatasetError> {
    let mut iter = datasets.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Dataset::default());
    };
    first.require_column(key)?;
    iter.try_fold(first, |left, right| join_pair(&left, &right, key))
}

fn join_pair(left: &Dataset, right: &Dataset, key: &str) -> Result<Dataset, DatasetError> {
    let left_key = left.require_column(key)?;
    let right_key = right.require_column(key)?;

    let extra: Vec<usize> = right
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| left.column_index(name).is_none())
        .map(|(i, _)| i)
        .collect();

    let mut joined = Dataset::new(
        left.columns()
            .iter()
            .chain(extra.iter().map(|&i| &right.columns()[i]))
            .cloned(),
    );

    for l in left.rows() {
        let Some(value) = l.get(left_key) else {
            continue;
        };
        for r in right.rows().iter().filter(|r| r.get(right_key) == Some(value)) {
            let record: Record = l
                .values()
                .iter()
                .cloned()
                .chain(extra.iter().map(|&i| r.values()[i].clone()))
                .collect();
            joined.push(record)?;
        }
    }

    log::debug!(
        "Joined {} x {} row(s) on '{}' into {} row(s)",
        left.len(),
        right.len(),
        key,
        joined.len()
    );
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(columns: &[&str], rows: &[&[Option<&str>]]) -> Dataset {
        let mut ds = Dataset::new(columns.iter().copied());
        for row in rows {
            ds.push(row.iter().map(|v| v.map(str::to_string)).collect())
                .unwrap();
        }
        ds
    }

    #[test]
    fn test_inner_join_keeps_common_names() {
        let a = dataset(
            &["Название", "Адрес", "Телефон"],
            &[
                &[Some("X"), Some("ул. А"), Some("1")],
                &[Some("Y"), Some("ул. Б"), Some("2")],
            ],
        );
        let b = dataset(
            &["Название", "Адрес", "Кнопка"],
            &[
                &[Some("Y"), Some("другой адрес"), Some("Записаться")],
                &[Some("Z"), Some("ул. В"), None],
            ],
        );

        let joined = inner_join(vec![a, b], "Название").unwrap();

        assert_eq!(joined.columns(), ["Название", "Адрес", "Телефон", "Кнопка"]);
        assert_eq!(joined.len(), 1);
        assert_eq!(
            joined.rows()[0].values(),
            [
                Some("Y".to_string()),
                Some("ул. Б".to_string()),
                Some("2".to_string()),
                Some("Записаться".to_string())
            ]
        );
    }

    #[test]
    fn test_inner_join_without_common_rows_is_empty() {
        let a = dataset(&["Название"], &[&[Some("X")]]);
        let b = dataset(&["Название"], &[&[Some("Z")]]);
        let joined = inner_join(vec![a, b], "Название").unwrap();
        assert!(joined.is_empty());
        assert_eq!(joined.columns(), ["Название"]);
    }

    #[test]
    fn test_inner_join_across_three_datasets() {
        let a = dataset(&["Название"], &[&[Some("X")], &[Some("Y")], &[None]]);
        let b = dataset(&["Название"], &[&[Some("Y")], &[Some("X")], &[None]]);
        let c = dataset(&["Название"], &[&[Some("Y")]]);
        let joined = inner_join(vec![a, b, c], "Название").unwrap();
        assert_eq!(
            joined.column_values("Название").unwrap().collect::<Vec<_>>(),
            vec![Some("Y")]
        );
    }

    #[test]
    fn test_inner_join_single_and_empty_inputs() {
        let a = dataset(&["Название"], &[&[Some("X")]]);
        assert_eq!(inner_join(vec![a.clone()], "Название").unwrap(), a);
        assert_eq!(inner_join(vec![], "Название").unwrap(), Dataset::default());
        assert!(matches!(
            inner_join(vec![a], "ФИО"),
            Err(DatasetError::UnknownColumn(_))
        ));
    }
}
